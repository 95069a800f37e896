//! Task - typed closures behind a uniform, object-safe call surface.
//!
//! Two layers, as with any type-erased handler:
//! - **typed**: plain Rust functions `Fn(A, B, ..) -> R` where every parameter
//!   implements [`FromValue`] and `R` implements [`IntoResults`]
//! - **dyn**: [`DynTask`], which takes `Vec<Value>` and returns `Vec<Value>`
//!
//! [`IntoTask`] turns the former into the latter and records the parameter
//! kinds, so the dispatcher can validate a job before anything is called.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::domain::{Value, ValueKind};

/// Error returned by a task body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TaskError(String);

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A native type a task parameter can be.
pub trait FromValue: Sized {
    const KIND: ValueKind;

    fn from_value(value: Value) -> Option<Self>;
}

/// A native type a task can return.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

/// The full return of a task body, as an ordered result list.
pub trait IntoResults {
    fn into_results(self) -> Result<Vec<Value>, TaskError>;
}

macro_rules! native_value {
    ($($ty:ty => $variant:ident;)*) => {
        $(
            impl FromValue for $ty {
                const KIND: ValueKind = ValueKind::$variant;

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }

            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }

            impl IntoResults for $ty {
                fn into_results(self) -> Result<Vec<Value>, TaskError> {
                    Ok(vec![self.into_value()])
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

native_value! {
    i8 => I8;
    i16 => I16;
    i32 => I32;
    i64 => I64;
    u8 => U8;
    u16 => U16;
    u32 => U32;
    u64 => U64;
    f64 => F64;
    String => Str;
    bool => Bool;
    serde_json::Value => Other;
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Str(self.to_string())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoResults for Value {
    fn into_results(self) -> Result<Vec<Value>, TaskError> {
        Ok(vec![self])
    }
}

impl IntoResults for () {
    fn into_results(self) -> Result<Vec<Value>, TaskError> {
        Ok(Vec::new())
    }
}

impl IntoResults for Vec<Value> {
    fn into_results(self) -> Result<Vec<Value>, TaskError> {
        Ok(self)
    }
}

impl<A: IntoValue, B: IntoValue> IntoResults for (A, B) {
    fn into_results(self) -> Result<Vec<Value>, TaskError> {
        Ok(vec![self.0.into_value(), self.1.into_value()])
    }
}

impl<A: IntoValue, B: IntoValue, C: IntoValue> IntoResults for (A, B, C) {
    fn into_results(self) -> Result<Vec<Value>, TaskError> {
        Ok(vec![
            self.0.into_value(),
            self.1.into_value(),
            self.2.into_value(),
        ])
    }
}

impl<T: IntoResults, E: fmt::Display> IntoResults for Result<T, E> {
    fn into_results(self) -> Result<Vec<Value>, TaskError> {
        match self {
            Ok(v) => v.into_results(),
            Err(e) => Err(TaskError::new(e.to_string())),
        }
    }
}

/// Object-safe task. Arguments are expected to be validated already.
pub trait DynTask: Send + Sync {
    fn param_kinds(&self) -> &[ValueKind];

    fn call(&self, args: Vec<Value>) -> Result<Vec<Value>, TaskError>;
}

/// Conversion of a typed function into a [`DynTask`].
///
/// `Args` is only a marker so closures of different arities don't overlap.
pub trait IntoTask<Args>: Send + Sync + 'static {
    fn into_task(self) -> Arc<dyn DynTask>;
}

struct FnTask<F, Args> {
    f: F,
    kinds: Vec<ValueKind>,
    _marker: PhantomData<fn(Args)>,
}

macro_rules! impl_into_task {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> IntoTask<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: IntoResults + 'static,
            $($arg: FromValue + 'static,)*
        {
            fn into_task(self) -> Arc<dyn DynTask> {
                Arc::new(FnTask::<F, ($($arg,)*)> {
                    f: self,
                    kinds: vec![$($arg::KIND),*],
                    _marker: PhantomData,
                })
            }
        }

        impl<F, R, $($arg,)*> DynTask for FnTask<F, ($($arg,)*)>
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: IntoResults + 'static,
            $($arg: FromValue + 'static,)*
        {
            fn param_kinds(&self) -> &[ValueKind] {
                &self.kinds
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, args: Vec<Value>) -> Result<Vec<Value>, TaskError> {
                if args.len() != self.kinds.len() {
                    return Err(TaskError::new(format!(
                        "expected {} arguments, got {}",
                        self.kinds.len(),
                        args.len()
                    )));
                }
                let mut args = args.into_iter();
                $(
                    let $arg = args
                        .next()
                        .and_then($arg::from_value)
                        .ok_or_else(|| TaskError::new(format!("argument is not {}", $arg::KIND)))?;
                )*
                (self.f)($($arg),*).into_results()
            }
        }
    };
}

impl_into_task!();
impl_into_task!(A1);
impl_into_task!(A1, A2);
impl_into_task!(A1, A2, A3);
impl_into_task!(A1, A2, A3, A4);
impl_into_task!(A1, A2, A3, A4, A5);
impl_into_task!(A1, A2, A3, A4, A5, A6);

/// A named, type-described task held by the registry.
#[derive(Clone)]
pub struct RegisteredTask {
    name: String,
    callable: Arc<dyn DynTask>,
}

impl RegisteredTask {
    pub fn new<Args>(name: impl Into<String>, f: impl IntoTask<Args>) -> Self {
        Self::from_dyn(name, f.into_task())
    }

    pub fn from_dyn(name: impl Into<String>, callable: Arc<dyn DynTask>) -> Self {
        Self {
            name: name.into(),
            callable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_kinds(&self) -> &[ValueKind] {
        self.callable.param_kinds()
    }

    pub fn arity(&self) -> usize {
        self.callable.param_kinds().len()
    }

    pub fn invoke(&self, args: Vec<Value>) -> Result<Vec<Value>, TaskError> {
        self.callable.call(args)
    }
}

impl fmt::Debug for RegisteredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTask")
            .field("name", &self.name)
            .field("params", &self.param_kinds())
            .finish()
    }
}

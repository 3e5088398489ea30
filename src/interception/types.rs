//! Core types for method interception.
//!
//! - [`InterceptionMode`]: How a rewrite relates to the original method body
//! - [`CallContext`]: The intercepted call as seen by a handler
//! - [`InterceptionAction`]: A handler closure tagged with its mode
//! - [`InstalledHook`]: An action attached to a resolved method, owned by the backend
//! - [`dispatch`]: Runs a method call through its installed hooks

use std::{fmt, sync::Arc};

use strum::{Display, EnumIter, EnumString};

use crate::{
    runtime::{MethodRef, Value},
    Result,
};

/// How an interception relates to the original method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum InterceptionMode {
    /// The original body never runs, the handler's value is returned instead
    Replace,
    /// The handler runs first and may rewrite the arguments the original receives
    WrapBefore,
    /// The handler runs after the original and observes arguments and return value
    WrapAfter,
}

/// The intercepted call as seen by a handler.
pub struct CallContext<'a> {
    /// The method being invoked
    pub method: &'a MethodRef,
    /// The call's arguments
    pub args: &'a mut [Value],
}

impl CallContext<'_> {
    /// Returns an argument, if present.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Returns a mutable argument, if present.
    pub fn arg_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.args.get_mut(index)
    }
}

/// Handler that substitutes a method body.
pub type ReplaceFn = Arc<dyn Fn(&mut CallContext<'_>) -> Result<Value> + Send + Sync>;

/// Handler run before the original body.
pub type BeforeFn = Arc<dyn Fn(&mut CallContext<'_>) + Send + Sync>;

/// Handler run after the original body with its return value.
pub type AfterFn = Arc<dyn Fn(&CallContext<'_>, &Value) + Send + Sync>;

/// A rewrite handler tagged with its mode.
///
/// The variant fixes what the handler is allowed to do: only a [`Replace`](Self::Replace)
/// handler produces the call's return value, only a [`Before`](Self::Before) handler sees
/// the arguments mutably ahead of the original.
#[derive(Clone)]
pub enum InterceptionAction {
    /// Replace the original body
    Replace(ReplaceFn),
    /// Run before the original body
    Before(BeforeFn),
    /// Run after the original body
    After(AfterFn),
}

impl InterceptionAction {
    /// Returns the mode of this action.
    #[must_use]
    pub fn mode(&self) -> InterceptionMode {
        match self {
            InterceptionAction::Replace(_) => InterceptionMode::Replace,
            InterceptionAction::Before(_) => InterceptionMode::WrapBefore,
            InterceptionAction::After(_) => InterceptionMode::WrapAfter,
        }
    }
}

impl fmt::Debug for InterceptionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InterceptionAction::{}", self.mode())
    }
}

/// An action attached to a resolved method.
#[derive(Debug, Clone)]
pub struct InstalledHook {
    /// Id of the patch descriptor the action came from
    pub patch: Arc<str>,
    /// The handler
    pub action: InterceptionAction,
}

/// Runs one call through a method's installed hooks.
///
/// Hooks are evaluated in installation order:
///
/// 1. every wrap-before handler, each seeing the arguments left by the previous one
/// 2. the most recently installed replace handler, or the original body if there is none
/// 3. every wrap-after handler with the resulting value
///
/// An error from the original body or the replacing handler is returned and the wrap-after
/// handlers do not run.
///
/// # Errors
///
/// Propagates the error of the original body or the replacing handler.
pub fn dispatch<F>(
    hooks: &[InstalledHook],
    method: &MethodRef,
    args: &mut [Value],
    original: F,
) -> Result<Value>
where
    F: FnOnce(&mut [Value]) -> Result<Value>,
{
    let mut ctx = CallContext { method, args };

    for hook in hooks {
        if let InterceptionAction::Before(before) = &hook.action {
            before(&mut ctx);
        }
    }

    let replacement = hooks.iter().rev().find_map(|hook| match &hook.action {
        InterceptionAction::Replace(replace) => Some(replace),
        _ => None,
    });

    let result = match replacement {
        Some(replace) => replace(&mut ctx)?,
        None => original(&mut *ctx.args)?,
    };

    for hook in hooks {
        if let InterceptionAction::After(after) = &hook.action {
            after(&ctx, &result);
        }
    }

    Ok(result)
}

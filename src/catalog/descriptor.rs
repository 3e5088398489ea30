//! Patch descriptors and their interceptions.

use std::{fmt, sync::Arc};

use crate::{
    interception::{CallContext, InterceptionAction, InterceptionMode},
    runtime::{ArgumentShape, Value},
    Result,
};

/// One method-level rewrite: the target method and the action to run.
///
/// An interception says *what* changes about a method's behavior. How the rewrite is wired
/// into the runtime is the engine's and the detour backend's business.
///
/// # Examples
///
/// ```rust
/// use dotlaunch::{
///     catalog::Interception,
///     interception::InterceptionMode,
///     runtime::{ArgumentShape, ParamKind, Value},
/// };
///
/// let fix = Interception::replace("Game.Platform", "Supports", |_| Ok(Value::Bool(true)))
///     .with_shape(ArgumentShape::new().param(ParamKind::String));
///
/// assert_eq!(fix.mode(), InterceptionMode::Replace);
/// assert!(fix.skip_original());
/// assert_eq!(fix.target(), "Game.Platform::Supports(string)");
/// ```
#[derive(Clone)]
pub struct Interception {
    target_type: String,
    target_method: String,
    shape: Option<ArgumentShape>,
    action: InterceptionAction,
}

impl Interception {
    /// Replaces the method body with `handler`.
    pub fn replace<F>(
        target_type: impl Into<String>,
        target_method: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self::with_action(
            target_type,
            target_method,
            InterceptionAction::Replace(Arc::new(handler)),
        )
    }

    /// Runs `handler` before the original body. The handler may rewrite arguments.
    pub fn before<F>(
        target_type: impl Into<String>,
        target_method: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(&mut CallContext<'_>) + Send + Sync + 'static,
    {
        Self::with_action(
            target_type,
            target_method,
            InterceptionAction::Before(Arc::new(handler)),
        )
    }

    /// Runs `handler` after the original body with its return value.
    pub fn after<F>(
        target_type: impl Into<String>,
        target_method: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(&CallContext<'_>, &Value) + Send + Sync + 'static,
    {
        Self::with_action(
            target_type,
            target_method,
            InterceptionAction::After(Arc::new(handler)),
        )
    }

    fn with_action(
        target_type: impl Into<String>,
        target_method: impl Into<String>,
        action: InterceptionAction,
    ) -> Self {
        Self {
            target_type: target_type.into(),
            target_method: target_method.into(),
            shape: None,
            action,
        }
    }

    /// Narrows the target to the overload with this argument shape.
    #[must_use]
    pub fn with_shape(mut self, shape: ArgumentShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Fully qualified name of the declaring type.
    #[must_use]
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    /// Method name.
    #[must_use]
    pub fn target_method(&self) -> &str {
        &self.target_method
    }

    /// Argument shape, `None` for the first declared overload.
    #[must_use]
    pub fn shape(&self) -> Option<&ArgumentShape> {
        self.shape.as_ref()
    }

    /// The handler.
    #[must_use]
    pub fn action(&self) -> &InterceptionAction {
        &self.action
    }

    /// The rewrite mode.
    #[must_use]
    pub fn mode(&self) -> InterceptionMode {
        self.action.mode()
    }

    /// Whether the original body is suppressed. `true` exactly for replace.
    #[must_use]
    pub fn skip_original(&self) -> bool {
        self.mode() == InterceptionMode::Replace
    }

    /// Target as `Type::Method` or `Type::Method(shape)`.
    #[must_use]
    pub fn target(&self) -> String {
        match &self.shape {
            Some(shape) => format!("{}::{}{}", self.target_type, self.target_method, shape),
            None => format!("{}::{}", self.target_type, self.target_method),
        }
    }
}

impl fmt::Debug for Interception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interception")
            .field("target", &self.target())
            .field("mode", &self.mode())
            .finish()
    }
}

/// A named set of interceptions targeting one module.
///
/// Descriptors are immutable once built and shared as `Arc<PatchDescriptor>`.
#[derive(Debug, Clone)]
pub struct PatchDescriptor {
    id: String,
    target_module: String,
    description: String,
    interceptions: Vec<Interception>,
}

impl PatchDescriptor {
    /// Creates a descriptor with no interceptions.
    #[must_use]
    pub fn new(id: impl Into<String>, target_module: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target_module: target_module.into(),
            description: String::new(),
            interceptions: Vec::new(),
        }
    }

    /// Sets a human-readable description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends an interception.
    #[must_use]
    pub fn intercept(mut self, interception: Interception) -> Self {
        self.interceptions.push(interception);
        self
    }

    /// Unique id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Exact name of the module this descriptor patches.
    #[must_use]
    pub fn target_module(&self) -> &str {
        &self.target_module
    }

    /// Human-readable description, possibly empty.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Interceptions in declaration order.
    #[must_use]
    pub fn interceptions(&self) -> &[Interception] {
        &self.interceptions
    }
}

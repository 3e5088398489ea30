//! Callbacks the host library drives, and the detour ABI behind them.
//!
//! The host library reports module loads in one of two ways. A bare load notification names
//! the module only and leaves a placeholder in the [`ModuleSpace`]. A method table
//! notification describes the module's patchable methods, each with a native handle, and
//! loads a complete [`ModuleImage`] whose bodies call the original native method.
//!
//! When the engine installs the first hook on such a method the host library is asked to
//! redirect it to [`dispatch`]. From then on every call the runtime makes to that method
//! enters the host, runs through the installed hooks and reaches the original through
//! `dotlaunch_call_original` unless a hook replaces it.
//!
//! # Values
//!
//! Arguments and return values cross the boundary as [`RawValue`]. Strings written by the
//! host into a by-reference argument or the return slot stay valid until the next dispatch
//! on the same thread; the host library copies them before returning to the runtime.

use std::{
    cell::RefCell,
    ffi::{c_char, c_int, CStr, CString},
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    slice,
    str::FromStr,
    sync::{Arc, OnceLock, RwLock, Weak},
};

use dashmap::DashMap;
use libloading::Library;
use log::{debug, error, warn};

use crate::{
    runtime::{
        ArgumentShape, MethodRef, ModuleImage, ModuleInfo, ModuleSpace, Param, ParamKind, Value,
    },
    Error, Result,
};

/// Tag of a [`RawValue`].
pub mod kind {
    /// No value
    pub const VOID: u32 = 0;
    /// Null reference
    pub const NULL: u32 = 1;
    /// Boolean in `int`, non-zero is true
    pub const BOOL: u32 = 2;
    /// 32-bit integer in `int`
    pub const I32: u32 = 3;
    /// 64-bit integer in `int`
    pub const I64: u32 = 4;
    /// Double in `float`
    pub const F64: u32 = 5;
    /// NUL-terminated UTF-8 in `text`
    pub const STRING: u32 = 6;
    /// Object handle in `int`
    pub const OBJECT: u32 = 7;
}

/// A value crossing the host library boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawValue {
    /// One of the [`kind`] tags
    pub kind: u32,
    /// Integer payload
    pub int: i64,
    /// Floating point payload
    pub float: f64,
    /// String payload
    pub text: *const c_char,
}

impl RawValue {
    /// The void value, used to initialise return slots.
    pub const VOID: RawValue = RawValue {
        kind: kind::VOID,
        int: 0,
        float: 0.0,
        text: std::ptr::null(),
    };

    fn scalar(kind: u32, int: i64) -> Self {
        Self {
            kind,
            int,
            ..Self::VOID
        }
    }
}

/// One patchable method as described by the host library.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawMethod {
    /// Host-assigned handle, unique per process
    pub handle: u64,
    /// Fully qualified declaring type
    pub type_name: *const c_char,
    /// Method name
    pub name: *const c_char,
    /// Comma separated parameters, `"string, ref i32"`, empty or null for none
    pub params: *const c_char,
    /// Return kind, null for void
    pub returns: *const c_char,
}

/// Signature of [`dispatch`], handed to `dotlaunch_install_detour`.
pub type DispatchFn = extern "C" fn(u64, *mut RawValue, usize, *mut RawValue) -> c_int;
/// `int dotlaunch_install_detour(uint64_t handle, dispatch_fn dispatch)`
pub type InstallDetourFn = unsafe extern "C" fn(u64, DispatchFn) -> c_int;
/// `int dotlaunch_call_original(uint64_t handle, value *args, size_t argc, value *ret)`
pub type CallOriginalFn = unsafe extern "C" fn(u64, *mut RawValue, usize, *mut RawValue) -> c_int;

/// The detour entry points of a host library.
#[derive(Clone, Copy)]
pub struct DetourAbi {
    /// Redirects a native method to [`dispatch`]
    pub install: InstallDetourFn,
    /// Calls a native method's original body
    pub call_original: CallOriginalFn,
}

struct Attachment {
    space: Weak<ModuleSpace>,
    abi: Option<DetourAbi>,
    _library: Option<Arc<Library>>,
}

struct NativeMethod {
    space: Weak<ModuleSpace>,
    method: MethodRef,
}

static ATTACHMENT: RwLock<Option<Attachment>> = RwLock::new(None);
static NATIVE_METHODS: OnceLock<DashMap<u64, Arc<NativeMethod>>> = OnceLock::new();

thread_local! {
    static WRITTEN: RefCell<Vec<CString>> = const { RefCell::new(Vec::new()) };
}

fn native_methods() -> &'static DashMap<u64, Arc<NativeMethod>> {
    NATIVE_METHODS.get_or_init(DashMap::new)
}

/// Routes host library callbacks to `space`.
///
/// `library` is kept alive for as long as the callbacks may use its detour entry points.
pub(crate) fn attach(
    space: &Arc<ModuleSpace>,
    abi: Option<DetourAbi>,
    library: Option<Arc<Library>>,
) {
    *write_lock!(ATTACHMENT) = Some(Attachment {
        space: Arc::downgrade(space),
        abi,
        _library: library,
    });
}

#[cfg(test)]
pub(crate) fn detach() {
    *write_lock!(ATTACHMENT) = None;
}

fn attached() -> Option<(Arc<ModuleSpace>, Option<DetourAbi>)> {
    let attachment = read_lock!(ATTACHMENT);
    let attachment = attachment.as_ref()?;
    Some((attachment.space.upgrade()?, attachment.abi))
}

/// # Safety
///
/// `text` must be null or point to a NUL-terminated string.
unsafe fn owned(text: *const c_char) -> Option<String> {
    (!text.is_null()).then(|| CStr::from_ptr(text).to_string_lossy().into_owned())
}

/// Receives bare module load notifications.
pub(crate) extern "C" fn on_module_load(name: *const c_char, path: *const c_char) {
    let Some(name) = (unsafe { owned(name) }) else {
        return;
    };
    let path = unsafe { owned(path) }.map(PathBuf::from);

    match attached() {
        Some((space, _)) => {
            space.announce(ModuleInfo { name, path });
        }
        None => debug!("Module '{name}' loaded with no module space attached"),
    }
}

/// Receives module loads together with their patchable methods.
pub(crate) extern "C" fn on_module_table(
    name: *const c_char,
    path: *const c_char,
    methods: *const RawMethod,
    count: usize,
) {
    let Some(name) = (unsafe { owned(name) }) else {
        return;
    };
    let path = unsafe { owned(path) }.map(PathBuf::from);

    let Some((space, abi)) = attached() else {
        debug!("Module '{name}' loaded with no module space attached");
        return;
    };
    let Some(abi) = abi else {
        warn!("Method table of '{name}' ignored, host library exports no detour entry points");
        space.announce(ModuleInfo { name, path });
        return;
    };
    if space.has_methods(&name) {
        space.announce(ModuleInfo { name, path });
        return;
    }

    let raw = if methods.is_null() || count == 0 {
        &[][..]
    } else {
        unsafe { slice::from_raw_parts(methods, count) }
    };

    let mut image = ModuleImage::new(name.clone());
    if let Some(path) = path {
        image = image.with_path(path);
    }

    let mut slot = 0;
    for method in raw {
        let (type_name, method_name, shape, returns) = match unsafe { describe(method) } {
            Ok(described) => described,
            Err(error) => {
                warn!("Module '{name}': method {:#x} skipped, {error}", method.handle);
                continue;
            }
        };

        let params = shape.params().to_vec();
        native_methods().insert(
            method.handle,
            Arc::new(NativeMethod {
                space: Arc::downgrade(&space),
                method: MethodRef {
                    module: name.clone(),
                    type_name: type_name.clone(),
                    method: method_name.clone(),
                    params: params.clone(),
                    slot,
                },
            }),
        );

        let handle = method.handle;
        image = image
            .method(type_name, method_name, shape, returns, move |args| {
                call_original(abi, handle, &params, args)
            })
            .on_first_hook(move || arm(abi, handle));
        slot += 1;
    }

    debug!("Method table of '{name}' received, {slot} method(s)");
    space.load(image);
}

/// # Safety
///
/// The string pointers of `method` must be null or NUL-terminated.
unsafe fn describe(method: &RawMethod) -> Result<(String, String, ArgumentShape, ParamKind)> {
    let type_name = owned(method.type_name)
        .ok_or_else(|| Error::Native("method without declaring type".to_string()))?;
    let name =
        owned(method.name).ok_or_else(|| Error::Native("method without a name".to_string()))?;
    let shape = parse_shape(owned(method.params).as_deref().unwrap_or(""))?;
    let returns = match owned(method.returns) {
        Some(returns) => parse_kind(returns.trim())?,
        None => ParamKind::Void,
    };
    Ok((type_name, name, shape, returns))
}

fn parse_kind(text: &str) -> Result<ParamKind> {
    ParamKind::from_str(text)
        .map_err(|_| Error::Native(format!("unknown parameter kind '{text}'")))
}

/// Parses a parameter list such as `"string, ref i32"`.
pub fn parse_shape(text: &str) -> Result<ArgumentShape> {
    let mut shape = ArgumentShape::new();
    for param in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        shape = match param.split_once(' ') {
            Some(("ref" | "out", kind)) => shape.by_ref(parse_kind(kind.trim())?),
            Some(_) => return Err(Error::Native(format!("unknown parameter '{param}'"))),
            None => shape.param(parse_kind(param)?),
        };
    }
    Ok(shape)
}

fn arm(abi: DetourAbi, handle: u64) -> Result<()> {
    let status = unsafe { (abi.install)(handle, dispatch) };
    if status != 0 {
        return Err(Error::Native(format!(
            "host library refused detour of method {handle:#x} (status {status})"
        )));
    }
    debug!("Detour armed for method {handle:#x}");
    Ok(())
}

fn to_raw(value: &Value, keep: &mut Vec<CString>) -> Result<RawValue> {
    Ok(match value {
        Value::Void => RawValue::VOID,
        Value::Null => RawValue::scalar(kind::NULL, 0),
        Value::Bool(b) => RawValue::scalar(kind::BOOL, i64::from(*b)),
        Value::I32(v) => RawValue::scalar(kind::I32, i64::from(*v)),
        Value::I64(v) => RawValue::scalar(kind::I64, *v),
        Value::F64(v) => RawValue {
            kind: kind::F64,
            float: *v,
            ..RawValue::VOID
        },
        Value::String(s) => {
            let text = CString::new(s.as_str())
                .map_err(|_| Error::Invocation(format!("string argument contains NUL: {s:?}")))?;
            let raw = RawValue {
                kind: kind::STRING,
                text: text.as_ptr(),
                ..RawValue::VOID
            };
            keep.push(text);
            raw
        }
        Value::Object(handle) => RawValue::scalar(kind::OBJECT, *handle as i64),
    })
}

/// # Safety
///
/// A string value's `text` must be null or NUL-terminated.
unsafe fn from_raw(raw: &RawValue) -> Result<Value> {
    Ok(match raw.kind {
        kind::VOID => Value::Void,
        kind::NULL => Value::Null,
        kind::BOOL => Value::Bool(raw.int != 0),
        kind::I32 => Value::I32(raw.int as i32),
        kind::I64 => Value::I64(raw.int),
        kind::F64 => Value::F64(raw.float),
        kind::STRING => owned(raw.text).map_or(Value::Null, Value::String),
        kind::OBJECT => Value::Object(raw.int as u64),
        other => return Err(Error::Invocation(format!("unknown value kind {other}"))),
    })
}

fn call_original(
    abi: DetourAbi,
    handle: u64,
    params: &[Param],
    args: &mut [Value],
) -> Result<Value> {
    let mut keep = Vec::new();
    let mut raw = args
        .iter()
        .map(|value| to_raw(value, &mut keep))
        .collect::<Result<Vec<_>>>()?;
    let mut ret = RawValue::VOID;

    let status = unsafe { (abi.call_original)(handle, raw.as_mut_ptr(), raw.len(), &mut ret) };
    if status != 0 {
        return Err(Error::Invocation(format!(
            "original of method {handle:#x} failed (status {status})"
        )));
    }

    for ((param, slot), raw) in params.iter().zip(args.iter_mut()).zip(&raw) {
        if param.is_by_ref() {
            *slot = unsafe { from_raw(raw) }?;
        }
    }
    unsafe { from_raw(&ret) }
}

/// Entry point for calls the host library redirected to the host.
///
/// Returns 0 on success, -1 if the call failed and -2 if a hook panicked.
pub extern "C" fn dispatch(
    handle: u64,
    args: *mut RawValue,
    argc: usize,
    ret: *mut RawValue,
) -> c_int {
    match panic::catch_unwind(AssertUnwindSafe(|| dispatch_call(handle, args, argc, ret))) {
        Ok(Ok(())) => 0,
        Ok(Err(error)) => {
            warn!("Redirected call of method {handle:#x} failed: {error}");
            -1
        }
        Err(_) => {
            error!("Hook of method {handle:#x} panicked");
            -2
        }
    }
}

fn dispatch_call(
    handle: u64,
    args: *mut RawValue,
    argc: usize,
    ret: *mut RawValue,
) -> Result<()> {
    let target = native_methods()
        .get(&handle)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| Error::Invocation(format!("unknown native method {handle:#x}")))?;
    let space = target
        .space
        .upgrade()
        .ok_or_else(|| Error::Invocation("module space is gone".to_string()))?;

    let raw_args: &mut [RawValue] = if args.is_null() || argc == 0 {
        &mut []
    } else {
        unsafe { slice::from_raw_parts_mut(args, argc) }
    };
    let mut values = raw_args
        .iter()
        .map(|raw| unsafe { from_raw(raw) })
        .collect::<Result<Vec<_>>>()?;

    let result = space.invoke_method(&target.method, &mut values)?;

    WRITTEN.with(|written| {
        let mut written = written.borrow_mut();
        written.clear();
        let by_ref = target.method.params.iter().map(Param::is_by_ref);
        for ((by_ref, raw), value) in by_ref.zip(raw_args.iter_mut()).zip(&values) {
            if by_ref {
                *raw = to_raw(value, &mut written)?;
            }
        }
        if !ret.is_null() {
            let value = to_raw(&result, &mut written)?;
            unsafe { *ret = value };
        }
        Ok(())
    })
}

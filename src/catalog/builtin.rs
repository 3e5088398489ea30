//! Built-in compatibility patches.
//!
//! | Id | Module | Target | Mode |
//! |----|--------|--------|------|
//! | `symlink-noop` | `Mono.Posix` | `UnixFileSystemInfo::CreateSymbolicLink(string)` | replace |
//! | `native-library-names` | `System.Private.CoreLib` | `NativeLibrary::Load(string)` | wrap-before |
//! | `platform-capabilities` | `FNA` | `FNAPlatform::SupportsOrientationChanges()` | replace |
//! | `quiet-exit` | `FNA` | `SDL::SDL_ShowSimpleMessageBox` | replace |
//! | `frame-timing` | `FNA` | `Game::Tick()` | wrap-after |

use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
    catalog::{Interception, LibraryNameMap, PatchDescriptor},
    runtime::{ArgumentShape, ParamKind, Value},
    telemetry,
};

/// Id of the symbolic-link suppression patch.
pub const SYMLINK_NOOP: &str = "symlink-noop";
/// Id of the native library renaming patch.
pub const NATIVE_LIBRARY_NAMES: &str = "native-library-names";
/// Id of the platform capability patch.
pub const PLATFORM_CAPABILITIES: &str = "platform-capabilities";
/// Id of the exit prompt suppression patch.
pub const QUIET_EXIT: &str = "quiet-exit";
/// Id of the frame timing patch.
pub const FRAME_TIMING: &str = "frame-timing";

pub(crate) fn descriptors(names: Arc<LibraryNameMap>) -> Vec<PatchDescriptor> {
    vec![
        symlink_noop(),
        native_library_names(names),
        platform_capabilities(),
        quiet_exit(),
        frame_timing(),
    ]
}

fn symlink_noop() -> PatchDescriptor {
    PatchDescriptor::new(SYMLINK_NOOP, "Mono.Posix")
        .describe("Turns symbolic link creation into a no-op on filesystems that reject it")
        .intercept(
            Interception::replace(
                "Mono.Unix.UnixFileSystemInfo",
                "CreateSymbolicLink",
                |ctx| {
                    let path = ctx.arg(0).and_then(Value::as_str).unwrap_or("<unknown>");
                    info!("Symbolic link creation suppressed (no-op): {path}");
                    Ok(Value::Null)
                },
            )
            .with_shape(ArgumentShape::new().param(ParamKind::String)),
        )
}

fn native_library_names(names: Arc<LibraryNameMap>) -> PatchDescriptor {
    PatchDescriptor::new(NATIVE_LIBRARY_NAMES, "System.Private.CoreLib")
        .describe("Rewrites desktop native library names to the names shipped on the host")
        .intercept(
            Interception::before(
                "System.Runtime.InteropServices.NativeLibrary",
                "Load",
                move |ctx| {
                    let Some(Value::String(requested)) = ctx.arg_mut(0) else {
                        return;
                    };
                    if let Some(host) = names.rewrite(requested) {
                        debug!("Native library '{requested}' mapped to '{host}'");
                        *requested = host;
                    }
                },
            )
            .with_shape(ArgumentShape::new().param(ParamKind::String)),
        )
}

fn platform_capabilities() -> PatchDescriptor {
    PatchDescriptor::new(PLATFORM_CAPABILITIES, "FNA")
        .describe("Reports orientation changes as supported on handheld hosts")
        .intercept(
            Interception::replace(
                "Microsoft.Xna.Framework.FNAPlatform",
                "SupportsOrientationChanges",
                |_| Ok(Value::Bool(true)),
            )
            .with_shape(ArgumentShape::new()),
        )
}

fn quiet_exit() -> PatchDescriptor {
    PatchDescriptor::new(QUIET_EXIT, "FNA")
        .describe("Logs fatal message boxes instead of showing a desktop dialog")
        .intercept(Interception::replace(
            "SDL2.SDL",
            "SDL_ShowSimpleMessageBox",
            |ctx| {
                let title = ctx.arg(1).and_then(Value::as_str).unwrap_or_default();
                let message = ctx.arg(2).and_then(Value::as_str).unwrap_or_default();
                warn!("Message box suppressed: {title}: {message}");
                Ok(Value::I32(0))
            },
        ))
}

fn frame_timing() -> PatchDescriptor {
    PatchDescriptor::new(FRAME_TIMING, "FNA")
        .describe("Feeds per-frame timing into the process frame counters")
        .intercept(
            Interception::after("Microsoft.Xna.Framework.Game", "Tick", |_, _| {
                telemetry::frame_stats().tick();
            })
            .with_shape(ArgumentShape::new()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        interception::{CallContext, InterceptionAction, InterceptionMode},
        runtime::MethodRef,
    };

    fn method() -> MethodRef {
        MethodRef {
            module: "System.Private.CoreLib".into(),
            type_name: "System.Runtime.InteropServices.NativeLibrary".into(),
            method: "Load".into(),
            params: Vec::new(),
            slot: 0,
        }
    }

    #[test]
    fn test_builtin_ids_and_modes() {
        let all = descriptors(Arc::new(LibraryNameMap::default()));
        let summary: Vec<(&str, &str, InterceptionMode)> = all
            .iter()
            .map(|d| (d.id(), d.target_module(), d.interceptions()[0].mode()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (SYMLINK_NOOP, "Mono.Posix", InterceptionMode::Replace),
                (
                    NATIVE_LIBRARY_NAMES,
                    "System.Private.CoreLib",
                    InterceptionMode::WrapBefore
                ),
                (PLATFORM_CAPABILITIES, "FNA", InterceptionMode::Replace),
                (QUIET_EXIT, "FNA", InterceptionMode::Replace),
                (FRAME_TIMING, "FNA", InterceptionMode::WrapAfter),
            ]
        );
    }

    #[test]
    fn test_library_names_rewrites_argument() {
        let descriptor = native_library_names(Arc::new(LibraryNameMap::default()));
        let InterceptionAction::Before(before) = descriptor.interceptions()[0].action() else {
            panic!("expected wrap-before");
        };

        let method = method();
        let mut args = [Value::from("FNA3D.dll")];
        before(&mut CallContext {
            method: &method,
            args: &mut args,
        });
        assert_eq!(args[0], Value::from("libFNA3D.so"));

        let mut untouched = [Value::from("libc.so.6")];
        before(&mut CallContext {
            method: &method,
            args: &mut untouched,
        });
        assert_eq!(untouched[0], Value::from("libc.so.6"));
    }

    #[test]
    fn test_quiet_exit_returns_zero() {
        let descriptor = quiet_exit();
        let InterceptionAction::Replace(replace) = descriptor.interceptions()[0].action() else {
            panic!("expected replace");
        };

        let method = method();
        let mut args = [
            Value::I32(16),
            Value::from("Fatal"),
            Value::from("boom"),
            Value::Null,
        ];
        let result = replace(&mut CallContext {
            method: &method,
            args: &mut args,
        })
        .unwrap();
        assert_eq!(result, Value::I32(0));
    }
}

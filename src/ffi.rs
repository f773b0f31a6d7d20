//! JNI entry points for `com.rmanky.solus.Native`.
//!
//! Library-level failures (bad configuration, a panic while loading) are
//! reported from `JNI_OnLoad`, so the host sees them as a load error.
//! `startRustServer` itself only ever answers `true` or `false`.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};

use ::jni::objects::{JClass, JString};
use ::jni::sys::{jboolean, jint, JNI_ERR, JNI_FALSE, JNI_TRUE, JNI_VERSION_1_6};
use ::jni::JNIEnv;
use tracing::{error, warn};

use crate::{logging, runtime};

#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: *mut ::jni::sys::JavaVM, _reserved: *mut c_void) -> jint {
    logging::init(false);

    match panic::catch_unwind(runtime::init_from_env) {
        Ok(Ok(_)) => JNI_VERSION_1_6,
        Ok(Err(e)) => {
            error!("❌ Failed to load solus: {}", e);
            JNI_ERR
        }
        Err(_) => {
            error!("❌ Failed to load solus: panic during initialization");
            JNI_ERR
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_rmanky_solus_Native_startRustServer<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    j_replicate_key: JString<'local>,
    j_gemini_key: JString<'local>,
) -> jboolean {
    guarded(|| {
        let replicate_key = java_string(&mut env, &j_replicate_key);
        let gemini_key = java_string(&mut env, &j_gemini_key);
        runtime::start_rust_server(&replicate_key, &gemini_key)
    })
}

/// Read a Java string argument. `null` and unreadable strings become empty,
/// which the bridge rejects as a missing key.
fn java_string(env: &mut JNIEnv<'_>, value: &JString<'_>) -> String {
    if value.is_null() {
        return String::new();
    }
    match env.get_string(value) {
        Ok(s) => s.into(),
        Err(e) => {
            warn!("Failed to read string argument: {}", e);
            String::new()
        }
    }
}

/// Run `f`, turning a panic into `false` instead of unwinding into the JVM.
fn guarded(f: impl FnOnce() -> bool) -> jboolean {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(true) => JNI_TRUE,
        Ok(false) => JNI_FALSE,
        Err(_) => {
            error!("❌ startRustServer panicked");
            JNI_FALSE
        }
    }
}

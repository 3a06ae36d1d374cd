use std::ffi::c_void;

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::HMODULE,
        System::{
            Diagnostics::Debug::RtlCaptureStackBackTrace,
            LibraryLoader::{
                GetModuleHandleExW, GetModuleHandleW, GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS,
                GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            },
        },
    },
};

use crate::system::ModuleId;

/// Frames between the stack walk and the function asking for its caller:
/// this function and `system::caller_module`.
const OWN_FRAMES: u32 = 2;

#[inline(never)]
pub fn caller_module(depth: u32) -> ModuleId {
    let mut frames: [*mut c_void; 1] = [std::ptr::null_mut()];

    let captured = unsafe { RtlCaptureStackBackTrace(OWN_FRAMES + depth, &mut frames, None) };
    if captured == 0 {
        return ModuleId::UNKNOWN;
    }

    module_from_address(frames[0])
}

pub fn resolve_module(name: &str) -> Option<ModuleId> {
    let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();

    unsafe { GetModuleHandleW(PCWSTR(wide.as_ptr())) }
        .ok()
        .map(module_id)
}

fn module_from_address(address: *mut c_void) -> ModuleId {
    let mut module = HMODULE::default();

    // the address is treated as a location inside the image, not a name
    let found = unsafe {
        GetModuleHandleExW(
            GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            PCWSTR(address.cast::<u16>()),
            &mut module,
        )
    };

    match found {
        Ok(()) => module_id(module),
        Err(_) => ModuleId::UNKNOWN,
    }
}

#[allow(clippy::cast_sign_loss)]
fn module_id(module: HMODULE) -> ModuleId {
    ModuleId(module.0 as usize)
}

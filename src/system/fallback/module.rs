use crate::system::ModuleId;

/// Module attribution needs the Windows loader; elsewhere every caller is
/// reported as unknown, which the caller policies treat as the application.
pub fn caller_module(_depth: u32) -> ModuleId {
    ModuleId::UNKNOWN
}

pub fn resolve_module(_name: &str) -> Option<ModuleId> {
    None
}

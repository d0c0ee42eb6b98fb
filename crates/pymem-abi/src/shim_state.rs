//! Process-wide shim instance used by the exported symbols.

use std::sync::OnceLock;

use pymem_core::MemoryShim;

static GLOBAL_SHIM: OnceLock<MemoryShim> = OnceLock::new();

/// The shim behind every `PyMem_*` symbol, configured from the environment
/// on first use.
pub fn global_shim() -> &'static MemoryShim {
    GLOBAL_SHIM.get_or_init(MemoryShim::from_env)
}

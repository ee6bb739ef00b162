#![no_main]

use libfuzzer_sys::fuzz_target;
use dotpatch::backend::CilModule;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut module) = CilModule::from_mem(data.to_vec(), "Fuzz") {
        module.add_internals_visible_to("Fuzz.Tests");
        let _ = module.into_bytes();
    }
});

#![no_main]
use libfuzzer_sys::fuzz_target;
use machwalk::codec::SliceSource;
use machwalk::mach::symbols::SymbolTable;
use machwalk::options::ParseOptions;

fuzz_target!(|data: &[u8]| {
    if let Ok(machos) = machwalk::parse(data, &ParseOptions::permissive()) {
        for macho in &machos {
            let _ = macho.segments();
            let _ = SymbolTable::read(&mut SliceSource::new(data), macho);
        }
    }
});

#![no_main]
use libfuzzer_sys::fuzz_target;
use machwalk::mach::MachFile;
use machwalk::options::ParseOptions;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut file) = MachFile::parse(data, &ParseOptions::permissive()) {
        for macho in &mut file.headers {
            let _ = macho.rewrite_load_commands(|name| Some(format!("@rpath/{name}")));
        }
        let _ = file.to_image(data);
    }
});

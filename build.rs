use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-env-changed=HAZPTR_SCAN_THRESHOLD");

    let out_dir = env::var("OUT_DIR").expect("no out directory");
    let dest = Path::new(&out_dir).join("build_constants.rs");

    let mut file = File::create(&dest).expect("could not create file");

    let scan: u32 = match env::var("HAZPTR_SCAN_THRESHOLD") {
        Ok(val) => val.parse().expect("failed to parse env variable HAZPTR_SCAN_THRESHOLD"),
        Err(_) => 10,
    };

    if scan == 0 {
        panic!("invalid HAZPTR_SCAN_THRESHOLD value (0)");
    }

    write!(&mut file, "const DEFAULT_SCAN_THRESHOLD: u32 = {};", scan)
        .expect("could not write to file");
}

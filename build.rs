use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=LSF_LIBDIR");

    // Only the live surface links liblsf.
    if env::var_os("CARGO_FEATURE_LIBLSF").is_none() {
        return;
    }

    if let Some(dir) = env::var_os("LSF_LIBDIR") {
        println!("cargo:rustc-link-search=native={}", dir.to_string_lossy());
    }
}

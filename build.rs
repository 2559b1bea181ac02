fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Exposes the package version to the HTTP user agent through `built_info`.
    built::write_built_file().expect("Failed to acquire build-time information");
}

fn main() {
    let rev = authrpc_build::SourceDigest::new()
        .add_glob("src/**/*.rs")
        .add_path("Cargo.toml")
        .emit_rerun_if_changed()
        .compute();

    println!("cargo:rustc-env=APP_REVISION={}", rev);
}

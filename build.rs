fn main() {
    let mut build = cc::Build::new();

    build
        .file("c/engine.c")
        .include("include")
        .flag_if_supported("-std=c11")
        .flag_if_supported("-O2")
        .warnings(false);

    build.compile("ctensor_engine");

    println!("cargo:rerun-if-changed=c/engine.c");
    println!("cargo:rerun-if-changed=include/ctensor/engine.h");
}

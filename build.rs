fn main() {
    if cargo::target_os() == "android" && cargo::feature_enabled("native") {
        android::build();
    }
}

// The DEX pipeline follows netwatcher's [build.rs](https://github.com/thombles/netwatcher/blob/f1353ba6b9a9e4e28a223a317564a3b34a649aae/Cargo.toml).
mod android {
    use crate::cargo;
    use android_build::{DebugInfo, Dexer, JavaBuild};
    use std::fs;
    use std::path::{Path, PathBuf};

    const HANDLER_SOURCE: &str = "src/android/FerryMainHandler.java";
    const PACKAGE_DIR: &str = "rs/ferry";

    pub(super) fn build() {
        println!("cargo:rerun-if-changed={HANDLER_SOURCE}");

        let android_jar = android_build::android_jar(None)
            .expect("android.jar not found, is ANDROID_HOME set?");
        let classes_root = cargo::out_dir().join("java");
        compile_handler(&android_jar, &classes_root);
        let dex_path = dex_classes(&android_jar, &classes_root);

        println!("cargo:rustc-env=FERRY_DEX_PATH={}", dex_path.display());
    }

    fn compile_handler(android_jar: &Path, classes_root: &Path) {
        let package_dir = classes_root.join(PACKAGE_DIR);
        clean_dir(&package_dir);
        JavaBuild::new()
            .files(&[HANDLER_SOURCE])
            .class_path(android_jar)
            .classes_out_dir(&package_dir)
            .java_source_version(8)
            .java_target_version(8)
            .debug_info(debug_info(!cargo::is_release_profile()))
            .compile()
            .expect("failed to compile the main looper handler");
    }

    fn dex_classes(android_jar: &Path, classes_root: &Path) -> PathBuf {
        let dex_dir = cargo::out_dir().join("dex");
        clean_dir(&dex_dir);
        Dexer::new()
            .android_jar(android_jar)
            .class_path(classes_root)
            .collect_classes(classes_root)
            .expect("failed to collect the compiled handler classes")
            .release(cargo::is_release_profile())
            .android_min_api(21)
            .out_dir(&dex_dir)
            .run()
            .expect("failed to convert the handler classes to DEX");

        let dex_path = dex_dir.join("classes.dex");
        assert!(
            dex_path.exists(),
            "d8 did not produce {}",
            dex_path.display()
        );
        dex_path
    }

    fn clean_dir(dir: &Path) {
        _ = fs::remove_dir_all(dir);
        fs::create_dir_all(dir)
            .unwrap_or_else(|e| panic!("failed to create {}: {e}", dir.display()));
    }

    fn debug_info(enabled: bool) -> DebugInfo {
        DebugInfo {
            line_numbers: enabled,
            source_files: enabled,
            variables: enabled,
        }
    }
}

mod cargo {
    use std::env;
    use std::path::PathBuf;

    pub(super) fn is_release_profile() -> bool {
        env::var("PROFILE").is_ok_and(|p| p == "release")
    }

    pub(super) fn feature_enabled(feature: &str) -> bool {
        let var = format!("CARGO_FEATURE_{}", feature.to_uppercase().replace('-', "_"));
        env::var_os(var).is_some()
    }

    pub(super) fn out_dir() -> PathBuf {
        env::var_os("OUT_DIR")
            .expect("cargo sets OUT_DIR for build scripts")
            .into()
    }

    pub(super) fn target_os() -> String {
        env::var("CARGO_CFG_TARGET_OS").expect("cargo sets CARGO_CFG_TARGET_OS for build scripts")
    }
}

// build.rs
// Compiles the viewer's GLSL variants to SPIR-V next to the build output

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_EXTENSIONS: [&str; 3] = ["vert", "frag", "comp"];

fn main() {
    println!("cargo:rerun-if-changed=../../resources/shaders");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        eprintln!("hint: Install the Vulkan SDK or point shader_dir at prebuilt .spv files");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        PathBuf::from(&vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        PathBuf::from(&vulkan_sdk).join("bin").join("glslc")
    };

    if !glslc.exists() {
        eprintln!("warning: glslc not found at {}, shader compilation skipped", glslc.display());
        return;
    }

    let shader_dir = PathBuf::from("../../resources/shaders");
    let target_dir = PathBuf::from("../../target/shaders");

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create {}: {}", target_dir.display(), e);
        return;
    }

    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: No shader directory found at {}", shader_dir.display());
            return;
        }
    };

    let mut compiled = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_shader = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SHADER_EXTENSIONS.contains(&ext));
        if !is_shader {
            continue;
        }

        // lit.vert -> lit.vert.spv, so stages of one variant never collide
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let out_file = target_dir.join(format!("{file_name}.spv"));

        if is_up_to_date(&path, &out_file) {
            continue;
        }

        match Command::new(&glslc).arg(&path).arg("-o").arg(&out_file).status() {
            Ok(status) if status.success() => {
                eprintln!("info: Compiled {} -> {}", file_name, out_file.display());
                compiled += 1;
            }
            Ok(status) => {
                panic!("glslc failed for {} with exit code {}", path.display(), status.code().unwrap_or(-1));
            }
            Err(e) => {
                panic!("Failed to run glslc for {}: {}", path.display(), e);
            }
        }
    }

    eprintln!("info: Compiled {compiled} shader(s)");
}

fn is_up_to_date(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(dst)) => src <= dst,
        _ => false,
    }
}

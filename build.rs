// Build script to compile GLSL shaders to SPIR-V
//
// Every `shaders/<name>.vert|frag` is compiled to `shaders/<name>.<stage>.spv`
// next to it. A missing glslc or a broken shader is reported as a warning:
// the editor can still run with previously compiled binaries, and hot reload
// picks up binaries compiled by hand.

use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_DIR: &str = "shaders";

fn main() {
    println!("cargo:rerun-if-changed={}/", SHADER_DIR);

    let sources = match shader_sources(Path::new(SHADER_DIR)) {
        Ok(sources) => sources,
        Err(e) => {
            println!("cargo:warning=cannot read {}: {}", SHADER_DIR, e);
            return;
        }
    };

    for input in sources {
        println!("cargo:rerun-if-changed={}", input.display());
        let mut output = input.clone().into_os_string();
        output.push(".spv");
        compile_shader(&input, Path::new(&output));
    }
}

fn shader_sources(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut sources: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext == "vert" || ext == "frag")
        })
        .collect();
    sources.sort();
    Ok(sources)
}

fn compile_shader(input: &Path, output: &Path) {
    // Check if glslc is available
    let result = Command::new("glslc").arg(input).arg("-o").arg(output).status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            println!(
                "cargo:warning=failed to compile {}: exit code {:?}",
                input.display(),
                status.code()
            );
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}); compile manually:", e);
            println!("cargo:warning=  glslc {} -o {}", input.display(), output.display());
        }
    }
}

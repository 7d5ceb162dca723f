// Build script to compile GLSL shaders to SPIR-V
//
// The engine reads the .spv files from disk at runtime, so a missing glslc
// only warns; the blobs can be compiled by hand.

use std::path::Path;
use std::process::Command;

const SHADERS: &[(&str, &str)] = &[
    ("shaders/triangle.vert", "shaders/vert.spv"),
    ("shaders/triangle.frag", "shaders/frag.spv"),
];

fn main() {
    for (input, _) in SHADERS {
        println!("cargo:rerun-if-changed={}", input);
    }

    for (input, output) in SHADERS {
        compile_shader(input, output);
    }
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!("cargo:warning=compile manually: glslc {} -o {}", input, output);
        }
    }
}

// Copyright (c) 2025 - Cowboy AI, LLC.

fn main() {
    let mut config = prost_build::Config::new();
    config
        .compile_well_known_types()
        .extern_path(".google.protobuf", "::prost_types");
    config
        .compile_protos(&["proto/agent_runtime.proto"], &["proto/"])
        .expect("failed to compile agent_runtime.proto");
}

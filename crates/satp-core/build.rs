fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_files = &["../../proto/satp/v1/crash_recovery.proto"];
    let includes = &["../../proto"];

    prost_build::Config::new()
        .type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]")
        .compile_protos(proto_files, includes)?;

    Ok(())
}

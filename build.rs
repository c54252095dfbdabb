use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Drop a template config next to the build output so operators know
    // which keys `config::DemuxConfig` understands.
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("../../../mpegts_demux.template.toml");

    let template = r#"# mpegts-demux configuration template
# Copy this file to 'mpegts_demux.toml' and adjust as needed.

[demux]
# Minimum run length of consecutive 0x47 sync bytes required to lock
# (Sync) or resynchronize (Check) onto packet boundaries.
sync_run_len = 5
"#;

    let _ = fs::write(template_path, template);
    println!("cargo:rerun-if-changed=build.rs");
}

// build.rs

fn main() {
    // Generate build info for script_exporter_build_info
    vergen::EmitBuilder::builder()
        .all_build()
        .all_git()
        .emit()
        .expect("Unable to generate build info");
}

use std::path::Path;

use cache_lib::config::HierarchyConfig;
use cache_lib::run_wrapper::{fetch_operations, run_trace, verify};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let param_tokens: Vec<String> = std::env::args().collect();
    let trace_path =
        param_tokens.get(1).ok_or("You should specify exactly one trace file")?;
    let operations = fetch_operations(Path::new(trace_path))?;

    let trace_base_name = Path::new(trace_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| trace_path.clone());
    std::fs::create_dir_all("eval")?;
    let output_path = format!("eval/multi_eval_{}.csv", trace_base_name);

    let mut writer = csv::Writer::from_path(&output_path)?;
    writer.write_record([
        "Policy",
        "Miss rate",
        "Total cycles",
        "Cycles per access",
        "AMAT",
    ])?;

    let configs = [
        ("Single-level", HierarchyConfig::single_level()),
        ("Multi-level inclusive", HierarchyConfig::inclusive()),
        ("Multi-level inclusive with VC", HierarchyConfig::inclusive_with_victim()),
        ("Multi-level exclusive", HierarchyConfig::exclusive()),
    ];
    for (name, config) in configs {
        let (mut hierarchy, top) = config.build()?;
        let report = run_trace(&mut hierarchy, top, &operations);
        verify(&hierarchy, top)?;
        writer.write_record(&[
            name.to_string(),
            format!("{:.5}", report.miss_rate),
            report.total_cycles.to_string(),
            format!("{:.3}", report.cycles_per_access),
            format!("{:.3}", report.amat),
        ])?;
    }
    writer.flush()?;
    log::info!("wrote {}", output_path);

    Ok(())
}

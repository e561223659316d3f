use cache_lib::config::HierarchyConfig;
use cache_lib::flags::CacheSimArgs;
use cache_lib::run_wrapper;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let args = CacheSimArgs::from_env_or_exit();

    let mut log_builder = env_logger::Builder::new();
    log_builder.filter_level(if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    });
    // RUST_LOG still wins
    log_builder.parse_default_env();
    log_builder.init();

    let config = match (&args.config, args.preset) {
        (Some(path), _) => HierarchyConfig::from_path(path)?,
        (None, Some(preset)) => preset.into(),
        (None, None) => HierarchyConfig::default(),
    };
    let (mut hierarchy, top) = config.build()?;

    let operations = run_wrapper::fetch_operations(&args.trace_file)?;
    let report = run_wrapper::run_trace(&mut hierarchy, top, &operations);

    if args.verify {
        run_wrapper::verify(&hierarchy, top)?;
        log::info!("hierarchy invariants hold");
    }

    print!("{}", report);

    if let Some(output) = &args.csv {
        let mut writer = csv::Writer::from_path(output)?;
        report.write_csv(&mut writer)?;
    }

    Ok(())
}

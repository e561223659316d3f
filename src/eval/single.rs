use std::path::Path;

use cache_lib::config::{HierarchyConfig, LevelConfig};
use cache_lib::memory::{WriteHitPolicy, WriteMissPolicy};
use cache_lib::run_wrapper::{fetch_operations, run_trace};
use plotters::prelude::*;

fn policy_name(hit: WriteHitPolicy, miss: WriteMissPolicy) -> &'static str {
    match (hit, miss) {
        (WriteHitPolicy::WriteBack, WriteMissPolicy::WriteAllocate) => "WB+WA",
        (WriteHitPolicy::WriteBack, WriteMissPolicy::WriteNoAllocate) => "WB+NWA",
        (WriteHitPolicy::WriteThrough, WriteMissPolicy::WriteAllocate) => "WT+WA",
        (WriteHitPolicy::WriteThrough, WriteMissPolicy::WriteNoAllocate) => "WT+NWA",
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let param_tokens: Vec<String> = std::env::args().collect();
    let trace_path =
        param_tokens.get(1).ok_or("You should specify exactly one trace file")?;
    let operations = fetch_operations(Path::new(trace_path))?;

    // Cache sizes: 4KB, 16KB, 64KB, 256KB, 1MB
    let cache_sizes = [4 * 1024, 16 * 1024, 64 * 1024, 256 * 1024, 1024 * 1024];
    // Block sizes: 32B, 64B, 128B, 256B
    let block_sizes = [32, 64, 128, 256];
    // Associativities: 2 to 32 ways
    let associativities = [2, 4, 8, 16, 32];
    let write_policies = [
        (WriteHitPolicy::WriteBack, WriteMissPolicy::WriteAllocate),
        (WriteHitPolicy::WriteBack, WriteMissPolicy::WriteNoAllocate),
        (WriteHitPolicy::WriteThrough, WriteMissPolicy::WriteAllocate),
        (WriteHitPolicy::WriteThrough, WriteMissPolicy::WriteNoAllocate),
    ];

    let trace_base_name = Path::new(trace_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| trace_path.clone());
    std::fs::create_dir_all("eval")?;
    let csv_path = format!("eval/single_eval_{}.csv", trace_base_name);
    let svg_path = format!("eval/single_eval_{}.svg", trace_base_name);

    let mut writer = csv::Writer::from_path(&csv_path)?;
    writer.write_record([
        "Cache size",
        "Block size",
        "Associativity",
        "Write policy",
        "Miss rate",
        "Total cycles",
        "Cycles per access",
        "AMAT",
    ])?;

    // Line series for each cache size, varying the block size
    // (2-way, write-back + write-allocate)
    let mut data: Vec<Vec<(usize, f64)>> = vec![vec![]; cache_sizes.len()];
    let mut y_max: f64 = 0.;
    for (i, cache_size) in cache_sizes.iter().enumerate() {
        for block_size in block_sizes {
            for associativity in associativities {
                let base = LevelConfig::make(*cache_size, block_size, associativity, 1);
                // Fewer sets than ways: not a meaningful configuration
                if base.policy().num_sets() < associativity {
                    log::debug!(
                        "skip {}B / {}B / {}-way",
                        cache_size,
                        block_size,
                        associativity
                    );
                    continue;
                }
                for (write_hit, write_miss) in write_policies {
                    let mut level = base.clone();
                    level.write_hit = write_hit;
                    level.write_miss = write_miss;
                    let config = HierarchyConfig {
                        levels: vec![level],
                        ..HierarchyConfig::single_level()
                    };

                    let (mut hierarchy, top) = config.build()?;
                    let report = run_trace(&mut hierarchy, top, &operations);
                    writer.write_record(&[
                        cache_size.to_string(),
                        block_size.to_string(),
                        associativity.to_string(),
                        policy_name(write_hit, write_miss).to_string(),
                        format!("{:.5}", report.miss_rate),
                        report.total_cycles.to_string(),
                        format!("{:.3}", report.cycles_per_access),
                        format!("{:.3}", report.amat),
                    ])?;

                    if associativity == 2
                        && write_hit == WriteHitPolicy::WriteBack
                        && write_miss == WriteMissPolicy::WriteAllocate
                    {
                        data[i].push((block_size, report.amat));
                        y_max = y_max.max(report.amat);
                    }
                }
            }
        }
    }
    writer.flush()?;
    log::info!("wrote {}", csv_path);

    // Plot the data
    let plot_title = format!("Single level evaluation (AMAT): {}", trace_base_name);
    let root = SVGBackend::new(svg_path.as_str(), (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut ctx = ChartBuilder::on(&root)
        .caption(plot_title.as_str(), ("sans-serif", 40).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(32..256, 0.0..y_max * 1.1)?;
    ctx.configure_mesh().x_desc("Block size").y_desc("AMAT").draw()?;

    for (i, cache_size) in cache_sizes.iter().enumerate() {
        let series = data[i].iter().map(|(x, y)| (*x as i32, *y));
        let label = format!("Cache size = {}", cache_size);
        let color = Palette99::pick(i).to_rgba();
        ctx.draw_series(LineSeries::new(series, color))?
            .label(label)
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color)
            });
    }

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    log::info!("wrote {}", svg_path);

    Ok(())
}

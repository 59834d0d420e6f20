use block_positioning::api::formatting::{render, OutputFormat, PositionFormatter, TextFormatter};
use block_positioning::processing::parser::{parse_scan_file, ScanBatch, ScanEntry};
use block_positioning::{Corner, PathLossModel, PositioningService, SystemConfig, TopologyRegistry};
use tracing_subscriber::EnvFilter;

const PROGRAM: &str = "block-positioning";

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // Logs go to stderr so stdout carries only the positions
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Batches that would be reported by the corner anchors for devices at the
/// given block-local positions
fn simulated_batches(
    registry: &TopologyRegistry,
    model: &PathLossModel,
    devices: &[(&str, &str, f64, f64)],
) -> Vec<ScanBatch> {
    let mut batches: Vec<ScanBatch> = Vec::new();
    for block in registry.blocks() {
        for corner in Corner::ALL {
            let anchor_id = block.corner(corner);
            let c = corner.local_position(block.side_length());
            let readings = devices
                .iter()
                .filter(|(_, name, _, _)| *name == block.name())
                .map(|(device_id, _, x, y)| {
                    let distance = ((x - c.x).powi(2) + (y - c.y).powi(2)).sqrt();
                    ScanEntry::new(*device_id, model.signal_strength_at(distance))
                })
                .collect();
            batches.push(ScanBatch { anchor_id, readings });
        }
    }
    batches
}

fn demo() -> Result<(), Box<dyn std::error::Error>> {
    let config = SystemConfig::default();
    init_logging(&config.log_filter);

    println!("=== BLOCK POSITIONING DEMO ===");
    let service = PositioningService::from_config(&config)?;
    for block in service.registry().blocks() {
        println!(
            "Block {}: side {:.1} m, origin {:?}, corners {:?}",
            block.name(),
            block.side_length(),
            block.origin(),
            block.corners()
        );
    }

    let devices = [
        ("aa:00:00:00:00:01", "A", 5.0, 5.0),
        ("aa:00:00:00:00:02", "A", 2.0, 8.0),
        ("bb:00:00:00:00:01", "B", 7.5, 1.5),
    ];
    let mut batches = simulated_batches(service.registry(), service.aggregator().model(), &devices);

    // One device only heard by three corners of block A
    for batch in batches.iter_mut().filter(|b| b.anchor_id != 1004 && b.anchor_id < 1005) {
        batch.readings.push(ScanEntry::new("cc:00:00:00:00:01", -55.0));
    }
    // And a reading the firmware garbled
    if let Some(batch) = batches.first_mut() {
        batch.readings.push(ScanEntry {
            device_id: Some("dd:00:00:00:00:01".into()),
            signal_strength: Some("weak".into()),
            scanner_id: None,
        });
    }

    for report in service.ingest_batches(&batches) {
        println!(
            "Anchor {}: {} accepted, {} skipped",
            report.anchor_id,
            report.accepted,
            report.skipped_count()
        );
    }

    let pass = service.run_pass();
    let records = PositionFormatter::with_diagnostics().records(&pass.estimates);
    println!();
    print!("{}", TextFormatter::new().format_pass(&pass, &records));

    println!("\nTrue positions:");
    for (device_id, block, x, y) in devices {
        println!("  {} [{}] ({:.2}, {:.2})", device_id, block, x, y);
    }
    println!("\n=== DEMO COMPLETE ===");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() == 2 && args[1] == "--demo" {
        return demo();
    }

    let format = match args.len() {
        3 => OutputFormat::default(),
        5 if args[3] == "--format" => args[4].parse::<OutputFormat>()?,
        _ => {
            let program = args.first().map_or(PROGRAM, |s| s.as_str());
            eprintln!("Usage: {} <config.json> <scans.json> [--format json|csv|text]", program);
            eprintln!("   or: {} --demo", program);
            return Err("Invalid arguments".into());
        }
    };

    let config = SystemConfig::from_file(&args[1])?;
    init_logging(&config.log_filter);

    let service = PositioningService::from_config(&config)?;
    let scans = std::fs::read_to_string(&args[2])?;
    let batches = parse_scan_file(&scans)?;
    service.ingest_batches(&batches);

    let pass = service.run_pass();
    for skipped in pass.failures() {
        tracing::warn!(device = %skipped.device_id, reason = ?skipped.reason, "not positioned");
    }
    let records = PositionFormatter::new().records(&pass.estimates);
    println!("{}", render(format, &records)?);

    Ok(())
}

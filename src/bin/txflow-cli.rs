use clap::{App, Arg, ArgMatches, SubCommand};
use std::{collections::VecDeque, str::FromStr, sync::Arc};
use txflow::{
    error::FlowPoolError, DescriptorSlab, FlowAction, FlowControlConfig, FlowPoolManager, FlowType,
    InvalidPoolOverflow, RecordingSink, Result, TxDescriptor,
};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("txflow-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Transmit flow pool simulator")
        .subcommand(
            SubCommand::with_name("simulate")
                .about("Run a map/send/complete/unmap scenario against a simulated device")
                .arg(
                    Arg::with_name("slab_size")
                        .short("s")
                        .long("slab-size")
                        .value_name("COUNT")
                        .help("Descriptors in the global slab")
                        .default_value("64")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("pool_size")
                        .short("p")
                        .long("pool-size")
                        .value_name("COUNT")
                        .help("Descriptors requested per flow pool")
                        .default_value("32")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("flows")
                        .short("f")
                        .long("flows")
                        .value_name("COUNT")
                        .help("Number of flows to map")
                        .default_value("2")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("packets")
                        .short("n")
                        .long("packets")
                        .value_name("COUNT")
                        .help("Packets to send per flow")
                        .default_value("100")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("completion_lag")
                        .short("l")
                        .long("completion-lag")
                        .value_name("COUNT")
                        .help("Packets kept in flight before completions start")
                        .default_value("24")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("config")
                        .short("c")
                        .long("config")
                        .value_name("FILE")
                        .help("Flow control configuration (TOML)")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("config")
                .about("Validate a flow control configuration file")
                .arg(
                    Arg::with_name("file")
                        .value_name("FILE")
                        .help("TOML file to check")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(SubCommand::with_name("info").about("Show version and defaults"))
        .get_matches();

    match matches.subcommand() {
        ("simulate", Some(sim_matches)) => handle_simulate(sim_matches),
        ("config", Some(config_matches)) => handle_config(config_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn parse_arg<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    matches
        .value_of(name)
        .ok_or_else(|| FlowPoolError::invalid_parameter(name, "Missing value"))?
        .parse()
        .map_err(|_| FlowPoolError::invalid_parameter(name, "Invalid number"))
}

fn load_config(matches: &ArgMatches) -> Result<FlowControlConfig> {
    match matches.value_of("config") {
        Some(path) => FlowControlConfig::from_file(path),
        // Many flows unmapped at once are expected to exceed the invalid pool limit
        None => Ok(FlowControlConfig::default().with_invalid_overflow(InvalidPoolOverflow::Report)),
    }
}

fn handle_simulate(matches: &ArgMatches) -> Result<()> {
    let slab_size: usize = parse_arg(matches, "slab_size")?;
    let pool_size: u16 = parse_arg(matches, "pool_size")?;
    let flows: u8 = parse_arg(matches, "flows")?;
    let packets: usize = parse_arg(matches, "packets")?;
    let lag: usize = parse_arg(matches, "completion_lag")?;
    let config = load_config(matches)?;

    println!("Simulating {} flows over a slab of {} descriptors", flows, slab_size);
    println!("Pool size: {}", pool_size);
    println!("Packets per flow: {}", packets);

    let slab = Arc::new(DescriptorSlab::new(slab_size));
    let sink = Arc::new(RecordingSink::new());
    let manager = FlowPoolManager::new(config, slab.clone(), sink.clone())?;

    for flow in 0..flows {
        manager.on_flow_map(flow, FlowType::Vdev as u8, flow, pool_size)?;
    }

    let start = std::time::Instant::now();
    let mut in_flight: VecDeque<TxDescriptor> = VecDeque::new();
    let mut sent = 0usize;
    let mut dropped = 0usize;

    for _ in 0..packets {
        for flow in 0..flows {
            match manager.acquire_for_flow(flow) {
                Some(descriptor) => {
                    sent += 1;
                    in_flight.push_back(descriptor);
                }
                None => dropped += 1,
            }
        }
        while in_flight.len() > lag {
            if let Some(descriptor) = in_flight.pop_front() {
                manager.release_descriptor(descriptor)?;
            }
        }
    }

    // Unmap with completions still pending so pools go through the invalid stage
    for flow in 0..flows {
        match manager.on_flow_unmap(flow, FlowType::Vdev as u8, flow) {
            Err(FlowPoolError::InvalidPoolLimit { count, limit }) => {
                println!("  warning: {} invalid pools exceed the limit of {}", count, limit)
            }
            other => other?,
        }
    }
    let invalid_after_unmap = manager.invalid_pool_count();
    while let Some(descriptor) = in_flight.pop_front() {
        manager.release_descriptor(descriptor)?;
    }
    let elapsed = start.elapsed();

    println!("\nResults:");
    println!("  Total time: {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    println!("  Sent: {}", sent);
    println!("  Dropped: {}", dropped);
    println!("  Pause signals: {}", sink.count(FlowAction::Pause));
    println!("  Resume signals: {}", sink.count(FlowAction::Resume));
    println!("  Invalid pools after unmap: {}", invalid_after_unmap);

    let diagnostics = manager.dump_diagnostics();
    println!("\n{}", diagnostics);

    manager.shutdown()?;
    let stats = slab.stats();
    println!("Slab after shutdown: {} / {} free", stats.free, stats.total);
    Ok(())
}

fn handle_config(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .value_of("file")
        .ok_or_else(|| FlowPoolError::invalid_parameter("file", "Missing path"))?;
    let config = FlowControlConfig::from_file(path)?;
    let rendered = toml::to_string_pretty(&config)
        .map_err(|err| FlowPoolError::config(format!("Cannot render configuration: {}", err)))?;

    println!("{} is valid\n", path);
    println!("{}", rendered);
    for capacity in [32u16, 256, 1024] {
        println!(
            "  pool of {:>4}: stop {:>4} start {:>4}",
            capacity,
            config.stop_threshold(capacity),
            config.start_threshold(capacity)
        );
    }
    Ok(())
}

fn show_info() -> Result<()> {
    println!("txflow v{}", txflow::VERSION);
    println!("Default stop threshold: {}%", txflow::config::DEFAULT_STOP_QUEUE_THRESHOLD_PCT);
    println!("Default start offset: {}%", txflow::config::DEFAULT_START_QUEUE_OFFSET_PCT);
    println!("Invalid pool limit: {}", txflow::config::MAX_INVALID_POOLS);
    println!(
        "Management pool: id {:#04x} size {}",
        txflow::config::MGMT_POOL_ID,
        txflow::config::MGMT_POOL_SIZE
    );
    Ok(())
}

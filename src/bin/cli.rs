use clap::{App, Arg, ArgMatches, SubCommand};
use shmconf::{
    records::{
        ComponentConfig, ComponentConfigKey, ComponentStatistics, ComponentStatisticsKey,
        COUNTER_SLOTS,
    },
    ConfigStore, RegionConfig, Result, SharedMemoryRegion, ShmConfError, StoreConfig,
};
use std::{path::PathBuf, str::FromStr};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("shmconf-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Shared-memory configuration store CLI Tool")
        .subcommand(
            SubCommand::with_name("create")
                .about("Create a region and lay out an empty table in it")
                .arg(name_arg())
                .arg(file_arg())
                .arg(
                    Arg::with_name("size")
                        .short("s")
                        .long("size")
                        .value_name("SIZE")
                        .help("Region size in bytes")
                        .default_value("262144")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("capacity")
                        .short("c")
                        .long("capacity")
                        .value_name("SLOTS")
                        .help("Slot count (a prime congruent to 3 mod 4)")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Show table statistics")
                .arg(name_arg())
                .arg(file_arg()),
        )
        .subcommand(
            SubCommand::with_name("put-config")
                .about("Insert a component configuration")
                .arg(name_arg())
                .arg(file_arg())
                .arg(component_type_arg())
                .arg(category_arg())
                .arg(
                    Arg::with_name("delay")
                        .short("d")
                        .long("delay")
                        .value_name("SECONDS")
                        .help("Delay value")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("get-config")
                .about("Read a component configuration")
                .arg(name_arg())
                .arg(file_arg())
                .arg(component_type_arg())
                .arg(category_arg()),
        )
        .subcommand(
            SubCommand::with_name("put-stats")
                .about("Insert a statistics record")
                .arg(name_arg())
                .arg(file_arg())
                .arg(id_arg()),
        )
        .subcommand(
            SubCommand::with_name("bump-counter")
                .about("Atomically add to a statistics counter")
                .arg(name_arg())
                .arg(file_arg())
                .arg(id_arg())
                .arg(
                    Arg::with_name("counter")
                        .long("counter")
                        .value_name("INDEX")
                        .help("Counter index; the reference count when omitted")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("by")
                        .long("by")
                        .value_name("DELTA")
                        .help("Amount to add")
                        .default_value("1")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("get-stats")
                .about("Read a statistics record")
                .arg(name_arg())
                .arg(file_arg())
                .arg(id_arg()),
        )
        .subcommand(
            SubCommand::with_name("list")
                .about("List every stored record key")
                .arg(name_arg())
                .arg(file_arg()),
        )
        .get_matches();

    match matches.subcommand() {
        ("create", Some(m)) => handle_create(m),
        ("info", Some(m)) => handle_info(m),
        ("put-config", Some(m)) => handle_put_config(m),
        ("get-config", Some(m)) => handle_get_config(m),
        ("put-stats", Some(m)) => handle_put_stats(m),
        ("bump-counter", Some(m)) => handle_bump_counter(m),
        ("get-stats", Some(m)) => handle_get_stats(m),
        ("list", Some(m)) => handle_list(m),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn name_arg() -> Arg<'static, 'static> {
    Arg::with_name("name")
        .short("n")
        .long("name")
        .value_name("NAME")
        .help("Name of the region")
        .required(true)
        .takes_value(true)
}

fn file_arg() -> Arg<'static, 'static> {
    Arg::with_name("file")
        .short("f")
        .long("file")
        .value_name("FILE")
        .help("Backing file path (defaults to /tmp/shmconf_<NAME>)")
        .takes_value(true)
}

fn component_type_arg() -> Arg<'static, 'static> {
    Arg::with_name("type")
        .short("t")
        .long("type")
        .value_name("TYPE")
        .help("Component type")
        .required(true)
        .takes_value(true)
}

fn category_arg() -> Arg<'static, 'static> {
    Arg::with_name("category")
        .long("category")
        .value_name("CATEGORY")
        .help("Component category")
        .default_value("0")
        .takes_value(true)
}

fn id_arg() -> Arg<'static, 'static> {
    Arg::with_name("id")
        .short("i")
        .long("id")
        .value_name("ID")
        .help("Component instance id")
        .required(true)
        .takes_value(true)
}

fn parse<T: FromStr>(matches: &ArgMatches, arg: &str) -> Result<T> {
    let raw = matches
        .value_of(arg)
        .ok_or_else(|| ShmConfError::invalid_parameter(arg, "Missing value"))?;
    raw.parse()
        .map_err(|_| ShmConfError::invalid_parameter(arg, format!("Invalid value '{}'", raw)))
}

fn region_config(matches: &ArgMatches, config: RegionConfig) -> RegionConfig {
    match matches.value_of("file") {
        Some(path) => config.with_file_path(PathBuf::from(path)),
        None => config,
    }
}

fn open_store(matches: &ArgMatches) -> Result<ConfigStore> {
    let name: String = parse(matches, "name")?;
    let region = SharedMemoryRegion::open(region_config(matches, RegionConfig::open(name)))?;
    ConfigStore::open(region, StoreConfig::default())
}

fn handle_create(matches: &ArgMatches) -> Result<()> {
    let name: String = parse(matches, "name")?;
    let size: usize = parse(matches, "size")?;
    let mut store_config = StoreConfig::default();
    if matches.is_present("capacity") {
        store_config = store_config.with_capacity(parse(matches, "capacity")?);
    }

    let store =
        ConfigStore::create_new(region_config(matches, RegionConfig::new(name, size)), store_config)?;
    let path = store.region().info().path.clone();

    println!(
        "Created region '{}' with {} slots ({} bytes each)",
        store.region().name(),
        store.capacity(),
        store.layout().slot_size
    );
    if let Some(path) = path {
        println!("  Backing file: {}", path.display());
    }
    Ok(())
}

fn handle_info(matches: &ArgMatches) -> Result<()> {
    let store = open_store(matches)?;
    let stats = store.stats();

    println!("Region '{}'", store.region().name());
    println!("  Capacity: {} slots", stats.capacity);
    println!("  Occupied: {} ({:.2}%)", stats.occupied, stats.load_factor() * 100.0);
    println!("  Slot size: {} bytes", stats.slot_size);
    println!("  Payload size: {} bytes", stats.payload_size);
    println!("  Region size: {} bytes", stats.region_size);
    println!("\nSchemas:");
    for schema in store.registry().iter() {
        println!(
            "  - {} (id {:#010x}, {} bytes)",
            schema.type_name, schema.type_id, schema.size
        );
        for field in schema.fields {
            println!("      {}", field);
        }
    }
    Ok(())
}

fn handle_put_config(matches: &ArgMatches) -> Result<()> {
    let store = open_store(matches)?;
    let record = ComponentConfig::new(
        parse(matches, "type")?,
        parse(matches, "category")?,
        parse(matches, "delay")?,
    );
    let view = store.insert(&record)?;
    println!("Stored {:?} in slot {}", record, view.slot_index());
    Ok(())
}

fn handle_get_config(matches: &ArgMatches) -> Result<()> {
    let store = open_store(matches)?;
    let key = ComponentConfigKey {
        component_type: parse(matches, "type")?,
        category: parse(matches, "category")?,
    };
    let view = store.lookup(&key)?;
    println!("{:?}", view.read());
    Ok(())
}

fn handle_put_stats(matches: &ArgMatches) -> Result<()> {
    let store = open_store(matches)?;
    let record = ComponentStatistics::new(parse(matches, "id")?);
    let view = store.insert(&record)?;
    println!("Stored statistics for id {} in slot {}", record.id, view.slot_index());
    Ok(())
}

fn handle_bump_counter(matches: &ArgMatches) -> Result<()> {
    let store = open_store(matches)?;
    let id: i64 = parse(matches, "id")?;
    let delta: u64 = parse(matches, "by")?;
    let view = store.lookup(&ComponentStatisticsKey { id })?;

    if matches.is_present("counter") {
        let index: usize = parse(matches, "counter")?;
        if index >= COUNTER_SLOTS {
            return Err(ShmConfError::invalid_parameter(
                "counter",
                format!("Counter index must be below {}", COUNTER_SLOTS),
            ));
        }
        let previous = view.fetch_add_at(ComponentStatistics::COUNTERS, index, delta);
        println!("counters[{}]: {} -> {}", index, previous, previous.wrapping_add(delta));
    } else {
        let previous = view.fetch_add(ComponentStatistics::REF_COUNT, delta);
        println!("ref_count: {} -> {}", previous, previous.wrapping_add(delta));
    }
    Ok(())
}

fn handle_get_stats(matches: &ArgMatches) -> Result<()> {
    let store = open_store(matches)?;
    let view = store.lookup(&ComponentStatisticsKey {
        id: parse(matches, "id")?,
    })?;
    println!("{:?}", view.read());
    Ok(())
}

fn handle_list(matches: &ArgMatches) -> Result<()> {
    let store = open_store(matches)?;
    let keys = store.keys();
    if keys.is_empty() {
        println!("No records stored");
        return Ok(());
    }

    println!("Records:");
    for key in keys {
        let type_name = store
            .registry()
            .get(key.type_id())
            .map(|schema| schema.type_name)
            .unwrap_or("<unknown>");
        println!("  - {} {:?}", type_name, key.fields());
    }
    Ok(())
}

use std::process;

use rand::prelude::*;
use rand::rngs::StdRng;

use kway_sort::{chunk_count, ExternalStorage, RamStorage, Sorter};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let size: usize = arg_parser.value_of_t_or_exit("size");
    let ram_size: usize = arg_parser.value_of_t_or_exit("ram_size");
    let block_size: usize = arg_parser.value_of_t_or_exit("block_size");
    let order: Order = arg_parser.value_of_t_or_exit("order");
    let seed: u64 = arg_parser.value_of_t_or_exit("seed");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));

    let mut input = ExternalStorage::from_values(generate_data(size, order, seed)).with_block_size(block_size);
    let mut output: ExternalStorage<i64> = ExternalStorage::new(size).with_block_size(block_size);
    let mut ram: RamStorage<i64> = RamStorage::new(ram_size);

    log::info!(
        "sorting {} elements through {} RAM cells ({} runs, block size {})",
        size,
        ram_size,
        chunk_count(ram_size, size),
        block_size
    );

    let sorter = match Sorter::new(threads) {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = sorter.sort(&mut input, &mut output, &mut ram) {
        log::error!("sorting error: {}", err);
        process::exit(1);
    }

    match output.first_disorder_index() {
        None => log::info!("output is sorted"),
        Some(pos) => {
            log::error!("output is NOT sorted, first disorder at index {}", pos);
            process::exit(1);
        }
    }

    log::info!("input storage: {:?}", input.io_stats());
    log::info!("output storage: {:?}", output.io_stats());
    log::info!("ram storage: {:?}", ram.io_stats());
}

fn generate_data(size: usize, order: Order, seed: u64) -> Vec<i64> {
    match order {
        Order::Asc => (0..size as i64).collect(),
        Order::Desc => (0..size as i64).rev().collect(),
        Order::Random => {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..size).map(|_| rng.gen()).collect()
        }
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        use clap::ArgEnum;
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
    Random,
}

impl Order {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        use clap::ArgEnum;
        Order::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Order as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("kway-sort")
        .about("external k-way merge sort demo over simulated block storage")
        .arg(
            clap::Arg::new("size")
                .short('n')
                .long("size")
                .help("number of elements to generate and sort")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("ram_size")
                .short('r')
                .long("ram-size")
                .help("RAM workspace capacity in elements")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("block_size")
                .short('b')
                .long("block-size")
                .help("I/O cost accounting block size")
                .takes_value(true)
                .default_value("1"),
        )
        .arg(
            clap::Arg::new("order")
                .short('o')
                .long("order")
                .help("input data order")
                .takes_value(true)
                .default_value("random")
                .possible_values(Order::possible_values()),
        )
        .arg(
            clap::Arg::new("seed")
                .short('s')
                .long("seed")
                .help("random data seed")
                .takes_value(true)
                .default_value("42"),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for the local sort pass")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}

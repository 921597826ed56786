use clap::Parser as _;
use rand::SeedableRng as _;

use partition_mergesort::{Partition, SortConfig, corner_cases, sort_partitions_with};

mod cli;
mod data;

/// Program entry point
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let config = args.sort_config();
    config.validate()?;

    println!(
        "Pool: {core} core / {max} max threads, keep-alive {keep_alive:?}, sizing: {sizing}",
        core = config.pool.core_threads,
        max = config.pool.max_threads,
        keep_alive = config.pool.keep_alive,
        sizing = args.sizing,
    );

    if args.skip_corner_cases {
        println!("Skipping corner cases");
    } else {
        run_corner_cases(&config)?;
    }

    let shape = data::Shape {
        partitions: args.partitions,
        blocks: args.blocks,
        block_size: args.block_size,
    };
    shape.validate()?;
    println!(
        "Runs: {runs}, Partitions: {partitions}, Blocks: {blocks}, Block size: {block_size}, \
         Data type: {data}",
        runs = args.runs,
        partitions = shape.partitions,
        blocks = shape.blocks,
        block_size = shape.block_size,
        data = args.data,
    );

    let mut rng = match args.seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => {
            println!("No seed provided, generating one using system rng");
            rand::rngs::StdRng::from_os_rng()
        }
    };

    let stats = match args.data {
        cli::DataType::Uniform => {
            perform_experiment::<data::UniformData>(&config, args.runs, shape, &mut rng)?
        }
        cli::DataType::Runs => {
            perform_experiment::<data::RunsData>(&config, args.runs, shape, &mut rng)?
        }
        cli::DataType::Disjoint => {
            perform_experiment::<data::DisjointData>(&config, args.runs, shape, &mut rng)?
        }
        cli::DataType::Skewed => {
            perform_experiment::<data::SkewedData>(&config, args.runs, shape, &mut rng)?
        }
    };

    println!("Stats (ms): {stats:?}");

    #[cfg(feature = "counters")]
    {
        use partition_mergesort::merging;

        println!(
            "Containers emitted untouched: {emitted}, decomposed: {decomposed}, \
             values merged: {merged}",
            emitted = merging::EMITTED_COUNTER.read(),
            decomposed = merging::DECOMPOSED_COUNTER.read(),
            merged = merging::MERGED_VALUES_COUNTER.read(),
        );
    }

    Ok(())
}

/// Sort the built-in corner cases and check their results
fn run_corner_cases(config: &SortConfig) -> anyhow::Result<()> {
    for (case, &input) in corner_cases::CORNER_CASES.iter().enumerate() {
        let partitions = corner_cases::to_partitions(input);
        let expected = oracle(&partitions);

        let sorted = sort_partitions_with(partitions, config)?;
        anyhow::ensure!(sorted == expected, "corner case {case} was not sorted: {sorted:?}");
    }

    println!(
        "All {count} corner cases passed",
        count = corner_cases::CORNER_CASES.len()
    );

    Ok(())
}

/// Perform a time sampling experiment on partitions generated by `D`
///
/// - runs: The number of samples to measure
/// - shape: The dimensions of the generated partitions
/// - rng: The rng used for sampling the data
fn perform_experiment<D: data::PartitionData>(
    config: &SortConfig,
    runs: usize,
    shape: data::Shape,
    rng: &mut rand::rngs::StdRng,
) -> anyhow::Result<rolling_stats::Stats<f64>> {
    let mut stats: rolling_stats::Stats<f64> = rolling_stats::Stats::new();

    let bar = indicatif::ProgressBar::new(runs as u64);

    for run in 0..=runs {
        let partitions = D::initialize(shape, rng);
        let expected = oracle(&partitions);

        let now = std::time::Instant::now();
        let sorted = sort_partitions_with(std::hint::black_box(partitions), config)?;
        let elapsed = now.elapsed();

        anyhow::ensure!(sorted == expected, "run {run} was not sorted");

        // NOTE: The first run only warms up
        if run != 0 {
            stats.update(elapsed.as_secs_f64() * 1_000.0);
            bar.inc(1);
        }
    }

    bar.finish();

    Ok(stats)
}

/// All values of `partitions` sorted by the standard library
fn oracle(partitions: &[Partition<u32>]) -> Vec<u32> {
    let mut values: Vec<u32> = partitions
        .iter()
        .cloned()
        .flat_map(Partition::into_values)
        .collect();
    values.sort_unstable();
    values
}

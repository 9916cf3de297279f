use std::{
    fmt,
    process,
    str::FromStr,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use argh::FromArgs;
use log::{LevelFilter, SetLoggerError, info};
use mempool::{ElementAllocator as _, LockedAllocator, SegregatedElements, error::Location};
use rand::{SeedableRng as _, rngs::StdRng};
use snafu::{ResultExt as _, Snafu, ensure};

use self::{
    container::SystemElements,
    report::Report,
    workload::{Outcome, Params, Point, WorkloadError},
};

mod ansi;
mod container;
mod logger;
mod report;
mod workload;

/// Time a randomized container resize workload on each allocator.
#[derive(Debug, FromArgs)]
struct Args {
    /// random seed (default: derived from the clock)
    #[argh(option)]
    seed: Option<u64>,
    /// number of containers of each element type
    #[argh(option, default = "1000")]
    vectors: usize,
    /// number of random resizes
    #[argh(option, default = "10_000")]
    picks: usize,
    /// maximum container length
    #[argh(option, default = "10_000")]
    max_len: usize,
    /// allocator to run: segregated, slab or system (default: all of them)
    #[argh(option)]
    engine: Option<Engine>,
    /// log level: off, error, warn, info, debug or trace
    #[argh(option, default = "LevelFilter::Info")]
    log_level: LevelFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engine {
    Segregated,
    Slab,
    System,
}

impl Engine {
    const ALL: [Self; 3] = [Self::Segregated, Self::Slab, Self::System];

    fn name(self) -> &'static str {
        match self {
            Self::Segregated => "segregated",
            Self::Slab => "slab",
            Self::System => "system",
        }
    }

    /// Engines to run for an optional `--engine` selection.
    fn selected(selection: Option<Self>) -> &'static [Self] {
        match selection {
            Some(Self::Segregated) => &[Self::Segregated],
            Some(Self::Slab) => &[Self::Slab],
            Some(Self::System) => &[Self::System],
            None => &Self::ALL,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|engine| engine.name() == s)
            .ok_or_else(|| format!("unknown engine `{s}`"))
    }
}

#[derive(Debug, Snafu)]
enum BenchError {
    #[snafu(display("failed to install logger"))]
    Logger {
        #[snafu(implicit)]
        location: Location,
        source: SetLoggerError,
    },
    #[snafu(display("--{name} must be at least 1"))]
    ZeroParameter {
        name: &'static str,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{engine} workload failed"))]
    Workload {
        engine: Engine,
        #[snafu(implicit)]
        location: Location,
        source: WorkloadError,
    },
}

fn main() {
    let args: Args = argh::from_env();

    if let Err(err) = run(&args) {
        let report = Report::new(err);
        eprintln!("{report}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), BenchError> {
    logger::init(args.log_level).context(LoggerSnafu)?;

    ensure!(args.vectors > 0, ZeroParameterSnafu { name: "vectors" });
    ensure!(args.max_len > 0, ZeroParameterSnafu { name: "max-len" });

    let params = Params {
        vectors: args.vectors,
        picks: args.picks,
        max_len: args.max_len,
    };
    let seed = args.seed.unwrap_or_else(clock_seed);
    info!("seed {seed}, {params:?}");

    for &engine in Engine::selected(args.engine) {
        let mut rng = StdRng::seed_from_u64(seed);
        let start = Instant::now();
        let outcome = run_engine(engine, params, &mut rng).context(WorkloadSnafu { engine })?;
        let elapsed = start.elapsed();

        info!(
            "correct assignment in integer container {} and point container {}",
            outcome.int_index, outcome.point_index
        );
        println!(
            "{engine:>10}: {:.3} seconds ({} live elements)",
            elapsed.as_secs_f64(),
            outcome.elements
        );
    }

    Ok(())
}

fn run_engine(engine: Engine, params: Params, rng: &mut StdRng) -> Result<Outcome, WorkloadError> {
    match engine {
        Engine::Segregated => {
            let shared = LockedAllocator::default();
            let ints = SegregatedElements::<i32>::new(&shared);
            let outcome = workload::run_vectors(&ints, &ints.rebind::<Point>(), params, rng)?;
            info!("segregated allocator: {:?}", shared.stats());
            Ok(outcome)
        }
        Engine::Slab => workload::run_lists(params, rng),
        Engine::System => {
            let ints = SystemElements::<i32>::new();
            workload::run_vectors(&ints, &ints.rebind::<Point>(), params, rng)
        }
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() ^ (u64::from(elapsed.subsec_nanos()) << 32))
}

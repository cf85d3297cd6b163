use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Deterministic client-pool simulator")]
pub(crate) struct Args {
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) duration: Option<Duration>,
    #[arg(long)]
    pub(crate) iterations: Option<u64>,
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    #[arg(long, default_value_t = 16)]
    pub(crate) tasks: usize,
    #[arg(long, default_value_t = 8)]
    pub(crate) max_total: usize,
    #[arg(long, default_value_t = 8)]
    pub(crate) max_idle: usize,
    #[arg(long)]
    pub(crate) test_on_borrow: bool,
    /// Chance that a held handle silently goes bad.
    #[arg(long, default_value_t = 0.02)]
    pub(crate) invalidate_rate: f64,
    /// Chance per step that the backend starts refusing new handles.
    #[arg(long, default_value_t = 0.005)]
    pub(crate) create_fail_rate: f64,
    /// Chance that a task drops its handle instead of releasing it.
    #[arg(long, default_value_t = 0.05)]
    pub(crate) drop_rate: f64,
    #[arg(long, default_value_t = 0.05)]
    pub(crate) sleep_rate: f64,
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    #[arg(long)]
    pub(crate) quick: bool,
    #[arg(long)]
    pub(crate) stress: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimConfig {
    pub(crate) duration_ms: Option<u64>,
    pub(crate) iterations: Option<u64>,
    pub(crate) seed: u64,
    pub(crate) tasks: usize,
    pub(crate) max_total: usize,
    pub(crate) max_idle: usize,
    pub(crate) test_on_borrow: bool,
    pub(crate) invalidate_rate: f64,
    pub(crate) create_fail_rate: f64,
    pub(crate) drop_rate: f64,
    pub(crate) sleep_rate: f64,
    pub(crate) log: Option<PathBuf>,
    pub(crate) preset: Option<String>,
    pub(crate) first_steps: usize,
    pub(crate) tail_steps: usize,
}

impl SimConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        let mut config = SimConfig {
            duration_ms: args
                .duration
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            iterations: args.iterations,
            seed: args.seed.unwrap_or_else(random_seed),
            tasks: args.tasks.max(1),
            max_total: args.max_total.max(1),
            max_idle: args.max_idle,
            test_on_borrow: args.test_on_borrow,
            invalidate_rate: clamp_rate(args.invalidate_rate),
            create_fail_rate: clamp_rate(args.create_fail_rate),
            drop_rate: clamp_rate(args.drop_rate),
            sleep_rate: clamp_rate(args.sleep_rate),
            log: args.log,
            preset: None,
            first_steps: 30,
            tail_steps: 80,
        };

        if args.quick {
            config.apply_quick();
        }
        if args.stress {
            config.apply_stress();
        }
        if config.iterations.is_none() && config.duration_ms.is_none() {
            config.iterations = Some(50_000);
        }

        config
    }

    fn apply_quick(&mut self) {
        self.preset = Some("quick".to_string());
        self.iterations = Some(10_000);
        self.duration_ms = None;
        self.tasks = 4;
        self.max_total = 2;
        self.max_idle = 1;
        self.test_on_borrow = true;
        self.invalidate_rate = 0.05;
        self.create_fail_rate = 0.01;
        self.drop_rate = 0.05;
        self.sleep_rate = 0.05;
    }

    fn apply_stress(&mut self) {
        self.preset = Some("stress".to_string());
        self.iterations = Some(250_000);
        self.duration_ms = None;
        self.tasks = 64;
        self.max_total = 16;
        self.max_idle = 4;
        self.test_on_borrow = true;
        self.invalidate_rate = 0.08;
        self.create_fail_rate = 0.02;
        self.drop_rate = 0.1;
        self.sleep_rate = 0.08;
    }
}

fn clamp_rate(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn random_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.as_secs() ^ u64::from(now.subsec_nanos())
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use tomasim::{assemble_file, Cpu, CpuConfig, PredictorConfig, SimError};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PredictorArg {
    NonSpeculative,
    AlwaysTaken,
    AlwaysNotTaken,
    Btfnt,
    Dynamic,
}
impl From<PredictorArg> for PredictorConfig {
    fn from(value: PredictorArg) -> Self {
        match value {
            PredictorArg::NonSpeculative => PredictorConfig::NonSpeculative,
            PredictorArg::AlwaysTaken => PredictorConfig::AlwaysTaken,
            PredictorArg::AlwaysNotTaken => PredictorConfig::AlwaysNotTaken,
            PredictorArg::Btfnt => PredictorConfig::Btfnt,
            PredictorArg::Dynamic => PredictorConfig::Dynamic {
                counter_max: 3,
                table_size: 16,
            },
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Assembly source, one instruction per line
    program: PathBuf,

    /// JSON machine description
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reorder buffer entries, 0 disables it
    #[arg(long)]
    rob_size: Option<usize>,

    #[arg(long, value_enum)]
    predictor: Option<PredictorArg>,

    #[arg(long)]
    max_cycles: Option<u64>,

    /// Extra cycle between issue and execute
    #[arg(long)]
    issue_delay: bool,

    /// Extra cycle between execute and write back
    #[arg(long)]
    writeback_delay: bool,

    /// Print every memory word that no longer holds its power-on value
    #[arg(long)]
    print_memory: bool,
}
impl Args {
    fn cpu_config(&self) -> Result<CpuConfig, SimError> {
        let mut config = match &self.config {
            Some(path) => CpuConfig::load(path)?,
            None => CpuConfig::default(),
        };

        if let Some(rob_size) = self.rob_size {
            config.rob_size = rob_size;
        }
        if let Some(predictor) = self.predictor {
            config.predictor = predictor.into();
        }
        if let Some(max_cycles) = self.max_cycles {
            config.max_cycles = max_cycles;
        }
        config.issue_delay |= self.issue_delay;
        config.writeback_delay |= self.writeback_delay;

        Ok(config)
    }
}

fn print_end_dbg(cpu: &Cpu, print_memory: bool) {
    for (reg, entry) in cpu.registers().iter().filter(|(_, e)| e.value != 0) {
        println!("{}: {}", reg, entry.value);
    }

    for unit in cpu.units() {
        println!("{}: {:?}, {} cycles", unit.name, unit.kind, unit.duration());
    }

    let flags = cpu.flags();
    println!("flags: zero={} negative={}", flags.zero, flags.negative);

    if print_memory {
        let memory = cpu.memory();
        let size = memory.cache().memory().size();
        for addr in 0..size {
            let value = memory.peek(addr as i64);
            if value != addr as i64 {
                println!("mem[{}]: {}", addr, value);
            }
        }

        let stats = memory.cache().stats();
        println!(
            "cache: {} read hits, {} read misses, {} write hits, {} write misses, {} evictions",
            stats.read_hits, stats.read_misses, stats.write_hits, stats.write_misses, stats.evictions
        );
    }
}

fn run(args: &Args) -> Result<(), SimError> {
    let config = args.cpu_config()?;
    let program = assemble_file(&args.program)?;

    let mut cpu = Cpu::new(config, program)?;
    let stats = cpu.run()?;

    print_end_dbg(&cpu, args.print_memory);
    print!("{}", stats);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

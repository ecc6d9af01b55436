use anyhow::{bail, ensure, Context};
use bakery::sync::BakeryMutex;
use clap::Parser;

/// Hammer a shared, non-atomic counter through a bakery lock
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Worker threads, each bound to its own participant id
    #[arg(short, long, default_value_t = 10)]
    threads: usize,

    /// Acquire, increment, release cycles per worker
    #[arg(short, long, default_value_t = 100)]
    cycles: u64,

    /// Participants the lock is sized for [default: threads]
    #[arg(long)]
    capacity: Option<usize>,

    /// Print when each worker starts and finishes
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let got = run(&cli)?;
    println!(
        "Counter value: {got} (expected {} x {})",
        cli.threads, cli.cycles
    );
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<u64> {
    ensure!(cli.threads > 0, "Expect at least 1 worker thread");
    let capacity = cli.capacity.unwrap_or(cli.threads);
    ensure!(
        capacity >= cli.threads,
        "Expect capacity={capacity} >= threads={}",
        cli.threads
    );
    let expected = (cli.threads as u64)
        .checked_mul(cli.cycles)
        .with_context(|| format!("{} x {} overflows the counter", cli.threads, cli.cycles))?;

    let counter = BakeryMutex::new(capacity, 0u64).context("Failed to build the bakery")?;
    std::thread::scope(|s| {
        for id in 0..cli.threads {
            let counter = &counter;
            s.spawn(move || {
                if cli.verbose {
                    println!("Worker {id} started");
                }
                for _ in 0..cli.cycles {
                    // SAFETY: id is unique to this worker and < capacity
                    let mut n = unsafe { counter.lock(id) };
                    *n += 1;
                }
                if cli.verbose {
                    println!("Worker {id} finished");
                }
            });
        }
    });

    let got = counter.into_inner();
    if got != expected {
        bail!("Counter value {got} != expected {expected}, mutual exclusion broken");
    }
    Ok(got)
}

#[cfg(test)]
mod tests {
    use super::{run, Cli};
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["bakery"]).unwrap();
        assert_eq!(cli.threads, 10);
        assert_eq!(cli.cycles, 100);
        assert_eq!(cli.capacity, None);
        assert!(!cli.verbose);
        assert_eq!(run(&cli).unwrap(), 1_000);
    }

    #[test]
    fn counts_every_cycle() {
        let cli = Cli::try_parse_from(["bakery", "-t", "8", "-c", "100000"]).unwrap();
        assert_eq!(run(&cli).unwrap(), 800_000);
    }

    #[test]
    fn spare_capacity() {
        let cli =
            Cli::try_parse_from(["bakery", "--threads", "3", "--cycles", "500", "--capacity", "64"])
                .unwrap();
        assert_eq!(run(&cli).unwrap(), 1_500);
    }

    #[test]
    fn rejects_bad_config() {
        let cli = Cli::try_parse_from(["bakery", "--threads", "0"]).unwrap();
        assert!(run(&cli).is_err());

        let cli = Cli::try_parse_from(["bakery", "--threads", "4", "--capacity", "2"]).unwrap();
        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("capacity=2 >= threads=4"));
    }
}

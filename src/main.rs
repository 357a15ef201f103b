// callprobe: ptrace checks, timings and a live view of the callchain fixture

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod cli {
    use std::ffi::OsString;
    use std::fs::File;
    use std::io::{self, BufWriter};
    use std::path::PathBuf;
    use std::time::Duration;

    use clap::{Args, Parser, Subcommand};
    use crossterm::{
        execute,
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    };
    use log::{info, LevelFilter};
    use ratatui::{backend::CrosstermBackend, Terminal};

    use callprobe::bench::{self, BenchConfig, DEFAULT_SEARCH_WORD};
    use callprobe::inspect::{self, Check};
    use callprobe::launch::{run_bounded, BoundedOutcome, Session};
    use callprobe::snapshot::CaptureLimits;
    use callprobe::ui::App;

    #[derive(Parser)]
    #[command(version, about)]
    pub struct Cli {
        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand)]
    enum Command {
        /// Run a scripted check against a freshly launched program
        Inspect {
            check: Check,
            #[command(flatten)]
            target: Target,
            /// Breakpoint at page(rip) + OFFSET instead of rip (hex)
            #[arg(long, value_name = "OFFSET", value_parser = parse_hex)]
            breakpoint_offset: Option<u64>,
        },
        /// Time ptrace operations over many runs and write a CSV
        Bench {
            #[command(flatten)]
            target: Target,
            #[arg(long, default_value_t = 30)]
            runs: usize,
            /// Iterations of the step, breakpoint, register and memory phases
            #[arg(long, default_value_t = 1000)]
            steps: usize,
            #[arg(long, default_value_t = 100)]
            search_passes: usize,
            #[arg(long, default_value_t = DEFAULT_SEARCH_WORD)]
            search_word: u64,
            /// Breakpoint at page(rip) + OFFSET instead of rip (hex)
            #[arg(long, value_name = "OFFSET", value_parser = parse_hex)]
            breakpoint_offset: Option<u64>,
            #[arg(short, long, value_name = "PATH", default_value = "timings_rust.csv")]
            output: PathBuf,
        },
        /// Step through a launched program in a terminal view
        Watch {
            #[command(flatten)]
            target: Target,
            /// Snapshots kept for stepping back
            #[arg(long, default_value_t = 256)]
            history: usize,
        },
        /// Run a program untraced and report whether it outlived the timeout
        Bounded {
            #[command(flatten)]
            target: Target,
            #[arg(long, value_name = "MS", default_value_t = 500)]
            timeout_ms: u64,
        },
    }

    #[derive(Args)]
    struct Target {
        /// Program to launch; defaults to the callchain binary beside this one
        #[arg(long, short)]
        program: Option<PathBuf>,
        /// Time to let the program run before attaching
        #[arg(long, value_name = "MS", default_value_t = 1000)]
        settle_ms: u64,
        /// Arguments passed to the program
        #[arg(last = true)]
        args: Vec<OsString>,
    }

    impl Target {
        fn program(&self) -> io::Result<PathBuf> {
            match &self.program {
                Some(program) => Ok(program.clone()),
                None => Ok(std::env::current_exe()?.with_file_name("callchain")),
            }
        }

        fn settle(&self) -> Duration {
            Duration::from_millis(self.settle_ms)
        }
    }

    fn parse_hex(value: &str) -> Result<u64, std::num::ParseIntError> {
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);
        u64::from_str_radix(digits, 16)
    }

    pub fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
        match cli.command {
            Command::Inspect {
                check,
                target,
                breakpoint_offset,
            } => {
                let report = inspect::run(
                    check,
                    &target.program()?,
                    &target.args,
                    target.settle(),
                    breakpoint_offset,
                )?;
                println!("{}", report);
                if !report.passed() {
                    return Err(format!("{} check failed", check).into());
                }
            }
            Command::Bench {
                target,
                runs,
                steps,
                search_passes,
                search_word,
                breakpoint_offset,
                output,
            } => {
                let config = BenchConfig {
                    runs,
                    steps,
                    search_passes,
                    search_word,
                    settle: target.settle(),
                    breakpoint_offset,
                };
                let mut out = BufWriter::new(File::create(&output)?);
                let results = bench::run(&target.program()?, &target.args, &config, &mut out)?;
                info!("wrote {} runs to {}", results.len(), output.display());
            }
            Command::Watch { target, history } => {
                let session = Session::launch(&target.program()?, &target.args, target.settle())?;
                watch(session, history)?;
            }
            Command::Bounded { target, timeout_ms } => {
                let timeout = Duration::from_millis(timeout_ms);
                match run_bounded(&target.program()?, &target.args, timeout)? {
                    BoundedOutcome::StillRunning { elapsed } => {
                        println!("still running after {} ms", elapsed.as_millis());
                    }
                    BoundedOutcome::Exited(status) => {
                        return Err(format!("exited before the timeout: {}", status).into());
                    }
                }
            }
        }
        Ok(())
    }

    fn watch(session: Session, history: usize) -> Result<(), Box<dyn std::error::Error>> {
        let mut app = App::new(session, history, CaptureLimits::default())?;

        // Log lines would tear the alternate screen
        let level = log::max_level();
        log::set_max_level(LevelFilter::Off);

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let res = app.run(&mut terminal);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        log::set_max_level(level);

        app.shutdown();
        res?;
        Ok(())
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use clap::Parser;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    cli::run(cli::Cli::parse())
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    Err("callprobe needs Linux on x86_64".into())
}

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::{error, info, warn, LevelFilter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use tdscf::defaults::{CONFIG_FILE_NAME, ENERGIES_FILE_NAME};
use tdscf::excited_states::{
    EigenSolver, ResponseKernelEvaluator, ResponseMatrixBuilder, ResponseMode, Root,
};
use tdscf::io::{
    load_calculation, print_roots, read_input, write_energies, write_footer, write_header,
    write_response_matrices, Calculation, Configuration,
};
use tdscf::utils::Timer;

/// Linear-response (TDA/TDDFT) excitation energies from a converged mean-field reference
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Directory that contains the checkpoint, the integrals and the grid
    #[arg(default_value = ".")]
    directory: PathBuf,
    /// Configuration file, defaults to tdscf.toml in the working directory
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn run(directory: &Path, config: &Configuration) -> Result<()> {
    let calculation: Calculation = load_calculation(directory, config)?;
    let evaluator = ResponseKernelEvaluator::new(
        &calculation.orbitals,
        &calculation.eri,
        calculation.xc_input(config.xc.collinearity()),
    )?
    .singlet(config.response.singlet);
    info!("response kernel: {}", evaluator.kind());

    let timer: Timer = Timer::start();
    let roots: Vec<Root> = EigenSolver::new(&evaluator, config.solver_settings()).kernel()?;
    info!("{}", timer);
    print_roots(&roots, evaluator.partition());
    write_energies(&roots, &directory.join(ENERGIES_FILE_NAME))?;

    if config.response.write_ab {
        let with_b: bool = config.response.mode == ResponseMode::Tddft;
        let block = ResponseMatrixBuilder::new(&evaluator).build(with_b)?;
        write_response_matrices(&block, directory)?;
    }
    Ok(())
}

fn main() {
    // Input.
    let cli: Cli = Cli::parse();
    let config_path: PathBuf = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.directory.join(CONFIG_FILE_NAME));
    let config: Configuration = match read_input(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{:#}", err);
            process::exit(1);
        }
    };

    // Logging.
    // The log level is set.
    let log_level: LevelFilter = match config.verbose {
        2 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        0 => LevelFilter::Info,
        -1 => LevelFilter::Warn,
        -2 => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    // and the logger is build.
    Builder::new()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter(None, log_level)
        .init();

    // Multithreading.
    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallelization.number_of_cores)
        .build_global()
    {
        warn!("thread pool could not be configured: {}", err);
    }

    // The program header is written to the command line.
    write_header();
    // and the total wall-time timer is started.
    let timer: Timer = Timer::start();

    let result: Result<()> = run(&cli.directory, &config);

    // Finished.
    // The total wall-time is printed together with the end statement.
    write_footer(timer);
    if let Err(err) = result {
        error!("{:#}", err);
        process::exit(1);
    }
}

mod fitness;
mod greedy;
mod habitat;
mod neighbors;
mod pool;
mod raster;
mod settings;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use greedy::GreedyRefiner;
use habitat::Habitat;
use pool::{ImagePool, SourceImage};
use settings::Settings;

/// progress is logged (and the interval timer reset) every this many generations
const LOG_INTERVAL: u64 = 500;
/// the best composite is written out every this many generations
const SNAPSHOT_INTERVAL: u64 = 5_000;

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    /// population-based search (the Habitat)
    Evolve,
    /// pure-random greedy refinement (no population)
    Greedy,
}

struct Args {
    images_dir: PathBuf,
    target: Option<PathBuf>,
    mode: Mode,
    generations: u64,
    px_per_image: u32,
    out: PathBuf,
    seed: u64,
}

fn usage() -> ! {
    eprintln!(
        "usage: evomosaic <images_dir> [--target <path>] [--mode evolve|greedy] \
         [--generations N] [--px-per-image N] [--out <path>] [--seed N]\n\
         without --target, the last image in the directory becomes the \
         reconstruction target and leaves the pool"
    );
    std::process::exit(2);
}

fn parse_args() -> Args {
    let mut argv = std::env::args().skip(1);
    let Some(images_dir) = argv.next() else { usage() };
    if images_dir.starts_with('-') {
        usage();
    }

    let mut args = Args {
        images_dir: PathBuf::from(images_dir),
        target: None,
        mode: Mode::Evolve,
        generations: 100_000,
        px_per_image: 10_000,
        out: PathBuf::from("out.png"),
        seed: 0xDEAD_BEEF,
    };

    while let Some(flag) = argv.next() {
        let mut value = || argv.next().unwrap_or_else(|| usage());
        match flag.as_str() {
            "--target" => args.target = Some(PathBuf::from(value())),
            "--mode" => {
                args.mode = match value().as_str() {
                    "evolve" => Mode::Evolve,
                    "greedy" => Mode::Greedy,
                    _ => usage(),
                }
            }
            "--generations" => args.generations = value().parse().unwrap_or_else(|_| usage()),
            "--px-per-image" => args.px_per_image = value().parse().unwrap_or_else(|_| usage()),
            "--out" => args.out = PathBuf::from(value()),
            "--seed" => args.seed = value().parse().unwrap_or_else(|_| usage()),
            _ => usage(),
        }
    }
    args
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // configure Rayon's global thread pool once at startup so worker threads
    // get nice names like "rayon-0"
    let _ = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("rayon-{i}"))
        .build_global();

    if let Err(err) = run(parse_args()) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let settings = Settings::load();
    settings.validate();
    if !std::path::Path::new("settings.json").exists() {
        // first run: persist the defaults so they are easy to tweak
        settings.save()?;
    }

    let pool = ImagePool::load_directory(&args.images_dir, args.px_per_image)?;

    let (pool, target) = match &args.target {
        Some(path) => {
            let target = pool::load_scaled(path, args.px_per_image)?;
            log::info!("reconstructing {}", path.display());
            (pool, target)
        }
        None => {
            let (pool, target) = pool.split_last();
            log::info!("reconstructing the last pool image ({} tiles remain)", pool.count());
            (pool, target)
        }
    };
    let pool = Arc::new(pool);
    let target = Arc::new(target);
    log::info!(
        "target {}x{}, {} source tiles, mode {}",
        target.width,
        target.height,
        pool.count(),
        if args.mode == Mode::Evolve { "evolve" } else { "greedy" },
    );

    match args.mode {
        Mode::Evolve => run_evolve(&args, settings, target, pool),
        Mode::Greedy => run_greedy(&args, settings, target, pool),
    }
}

fn run_evolve(
    args: &Args,
    settings: Settings,
    target: Arc<SourceImage>,
    pool: Arc<ImagePool>,
) -> Result<(), Box<dyn Error>> {
    let mut habitat = Habitat::new(Arc::clone(&target), pool, settings, args.seed);
    let mut timer = Instant::now();

    for generation in 1..=args.generations {
        habitat.step();

        if generation % LOG_INTERVAL == 0 {
            let best = habitat.best();
            log::info!(
                "generation {generation}: sad {} with {} placements ({:.2?} for {LOG_INTERVAL} gens)",
                best.fitness,
                best.placements.len(),
                timer.elapsed(),
            );
            timer = Instant::now();
        }
        if generation % SNAPSHOT_INTERVAL == 0 {
            write_png(&args.out, &target, &habitat.best().composite)?;
        }
    }

    write_png(&args.out, &target, &habitat.best().composite)?;
    log::info!("final sad {} written to {}", habitat.best().fitness, args.out.display());
    Ok(())
}

fn run_greedy(
    args: &Args,
    settings: Settings,
    target: Arc<SourceImage>,
    pool: Arc<ImagePool>,
) -> Result<(), Box<dyn Error>> {
    let mut refiner = GreedyRefiner::new(Arc::clone(&target), pool, settings, args.seed);
    let mut timer = Instant::now();

    for round in 1..=args.generations {
        refiner.round();

        if round % LOG_INTERVAL == 0 {
            log::info!(
                "round {round}: sad {} ({:.2?} for {LOG_INTERVAL} rounds)",
                refiner.fitness(),
                timer.elapsed(),
            );
            timer = Instant::now();
        }
        if round % SNAPSHOT_INTERVAL == 0 {
            write_png(&args.out, &target, &refiner.composite)?;
        }
    }

    write_png(&args.out, &target, &refiner.composite)?;
    log::info!("final sad {} written to {}", refiner.fitness(), args.out.display());
    Ok(())
}

fn write_png(path: &std::path::Path, target: &SourceImage, rgba: &[u8]) -> Result<(), Box<dyn Error>> {
    let img = image::RgbaImage::from_raw(target.width, target.height, rgba.to_vec())
        .ok_or("composite buffer does not match target dimensions")?;
    img.save(path)?;
    Ok(())
}

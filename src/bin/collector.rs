//! Collector - receives bridge POSTs and appends them to daily log files.
//!
//! Usage:
//!   collector --listen 0.0.0.0:8000 --dir ./logs

#[cfg(not(target_os = "espidf"))]
fn main() {
    use std::net::TcpListener;
    use std::path::PathBuf;

    use clap::Parser;
    use uart_telemetry_bridge::bridge::TASK_STACK_SIZE;
    use uart_telemetry_bridge::{collector, logging};

    /// Receive bridge telemetry and write it to logfile.<date>.txt
    #[derive(Parser, Debug)]
    #[command(author, version, about, long_about = None)]
    struct Args {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:8000")]
        listen: String,

        /// Directory for log files
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    }

    let args = Args::parse();

    match logging::init(log::LevelFilter::Info) {
        Ok(stream) => {
            if let Err(e) = logging::spawn_drain(stream, std::io::stdout(), TASK_STACK_SIZE) {
                eprintln!("log drain not started: {}", e);
            }
        }
        Err(e) => eprintln!("logger not installed: {}", e),
    }

    if let Err(e) = std::fs::create_dir_all(&args.dir) {
        eprintln!("cannot create {}: {}", args.dir.display(), e);
        std::process::exit(1);
    }

    let listener = match TcpListener::bind(&args.listen) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("cannot listen on {}: {}", args.listen, e);
            std::process::exit(1);
        }
    };

    collector::serve(listener, &args.dir)
}

// The collector runs on the host only
#[cfg(target_os = "espidf")]
fn main() {}

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use gridcut::config::{load_config, MethodConfig, OutputConfig, RuntimeConfig};
use gridcut::image::io as imgio;
use gridcut::segmentation::chanvese::{self, ChanVeseOptions};
use gridcut::segmentation::mumford_shah::{self, MumfordShahOptions};
use gridcut::segmentation::rousson_deriche::{self, RoussonDericheOptions};
use gridcut::segmentation::Termination;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let program = env::args().next().unwrap_or_else(|| "gridcut".to_string());
    let config = parse_args(&program)?;

    let img = imgio::load_grayscale::<f64>(&config.input_path)?;

    let start = Instant::now();
    let (report, labels, classes) = match &config.method {
        MethodConfig::ChanVese(opts) => {
            let out = chanvese::segment(&img, opts).map_err(|e| e.to_string())?;
            let report = Report {
                method: "chan-vese",
                energy: out.energy,
                iterations: out.iterations,
                status: out.status,
                means: vec![out.c1, out.c2],
                variances: None,
                latency_ms: 0.0,
            };
            (report, out.labels, 2)
        }
        MethodConfig::MumfordShah(opts) => {
            let out = mumford_shah::segment(&img, opts).map_err(|e| e.to_string())?;
            let report = Report {
                method: "mumford-shah",
                energy: out.energy,
                iterations: out.iterations,
                status: out.status,
                means: out.means.clone(),
                variances: None,
                latency_ms: 0.0,
            };
            (report, out.labels, opts.k)
        }
        MethodConfig::RoussonDeriche(opts) => {
            let out = rousson_deriche::segment(&img, opts).map_err(|e| e.to_string())?;
            let report = Report {
                method: "rousson-deriche",
                energy: out.energy,
                iterations: out.iterations,
                status: out.status,
                means: vec![out.c1, out.c2],
                variances: Some(vec![out.v1, out.v2]),
                latency_ms: 0.0,
            };
            (report, out.labels, 2)
        }
    };
    let mut report = report;
    report.latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    print_summary(&report);
    if let Some(path) = &config.output.labels_out {
        imgio::save_labels(&labels, classes, path)?;
        println!("Labels written to {}", path.display());
    }
    if let Some(path) = &config.output.json_out {
        imgio::write_json_file(path, &report)?;
        println!("JSON report written to {}", path.display());
    }
    Ok(())
}

#[derive(Serialize)]
struct Report {
    method: &'static str,
    energy: f64,
    iterations: usize,
    status: Termination,
    means: Vec<f64>,
    variances: Option<Vec<f64>>,
    latency_ms: f64,
}

fn print_summary(report: &Report) {
    println!("Segmentation summary");
    println!("  method: {}", report.method);
    println!("  status: {:?}", report.status);
    println!("  energy: {:.6}", report.energy);
    println!("  iterations: {}", report.iterations);
    let means: Vec<String> = report.means.iter().map(|c| format!("{c:.4}")).collect();
    println!("  means: [{}]", means.join(", "));
    if let Some(vars) = &report.variances {
        let vars: Vec<String> = vars.iter().map(|v| format!("{v:.6}")).collect();
        println!("  variances: [{}]", vars.join(", "));
    }
    println!("  latency_ms: {:.3}", report.latency_ms);
}

fn parse_args(program: &str) -> Result<RuntimeConfig, String> {
    let mut args = env::args().skip(1).peekable();
    let mut input_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut method = "chanvese".to_string();
    let mut lambda = 1.0f64;
    let mut mu = 1.0f64;
    let mut k = 3usize;
    let mut neighbourhood = "N8".to_string();
    let mut solver = "GRD-KO".to_string();
    let mut convergence = 1e-3f64;
    let mut max_iter = 30usize;
    let mut labels_out: Option<PathBuf> = None;
    let mut json_out: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("{}", usage(program));
                std::process::exit(0);
            }
            "--config" => config_path = Some(next_value(&mut args, "--config", program)?.into()),
            "--method" => method = next_value(&mut args, "--method", program)?,
            "--lambda" => lambda = parse_num(&next_value(&mut args, "--lambda", program)?)?,
            "--mu" => mu = parse_num(&next_value(&mut args, "--mu", program)?)?,
            "--k" => {
                k = next_value(&mut args, "--k", program)?
                    .parse()
                    .map_err(|_| "Invalid value for --k".to_string())?
            }
            "--nb" => neighbourhood = next_value(&mut args, "--nb", program)?,
            "--solver" => solver = next_value(&mut args, "--solver", program)?,
            "--conv" => convergence = parse_num(&next_value(&mut args, "--conv", program)?)?,
            "--max-iter" => {
                max_iter = next_value(&mut args, "--max-iter", program)?
                    .parse()
                    .map_err(|_| "Invalid value for --max-iter".to_string())?
            }
            "--labels-out" => {
                labels_out = Some(next_value(&mut args, "--labels-out", program)?.into())
            }
            "--json-out" => json_out = Some(next_value(&mut args, "--json-out", program)?.into()),
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option '{arg}'\n{}", usage(program)));
            }
            _ => {
                if input_path.is_some() {
                    return Err(format!(
                        "Unexpected positional argument '{arg}'\n{}",
                        usage(program)
                    ));
                }
                input_path = Some(PathBuf::from(arg));
            }
        }
    }

    if let Some(path) = config_path {
        return load_config(&path).map_err(|e| e.to_string());
    }

    let input_path = input_path.ok_or_else(|| usage(program))?;
    let method = match method.as_str() {
        "chanvese" => MethodConfig::ChanVese(ChanVeseOptions {
            lambda1: lambda,
            lambda2: lambda,
            mu,
            convergence,
            max_iter,
            neighbourhood,
            solver,
            seed: None,
        }),
        "mumford-shah" => MethodConfig::MumfordShah(MumfordShahOptions {
            k,
            lambda: vec![lambda],
            convergence,
            max_iter,
            neighbourhood,
            solver,
        }),
        "rousson-deriche" => MethodConfig::RoussonDeriche(RoussonDericheOptions {
            lambda,
            convergence,
            max_iter,
            neighbourhood,
            solver,
        }),
        other => {
            return Err(format!(
                "Unknown method '{other}'. Use chanvese|mumford-shah|rousson-deriche."
            ))
        }
    };

    Ok(RuntimeConfig {
        input_path,
        output: OutputConfig {
            labels_out,
            json_out,
        },
        method,
    })
}

fn next_value(
    args: &mut std::iter::Peekable<std::iter::Skip<env::Args>>,
    flag: &str,
    program: &str,
) -> Result<String, String> {
    args.next()
        .ok_or_else(|| format!("{flag} expects a value\n{}", usage(program)))
}

fn parse_num(value: &str) -> Result<f64, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid numeric value '{value}'"))
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} <image.png> [--method chanvese|mumford-shah|rousson-deriche] \\\n         \
         [--lambda l] [--mu m] [--k n] [--nb N4|N8|N16|N32] [--solver GRD-KO|GRD-PRF|GRD-PRH] \\\n         \
         [--conv c] [--max-iter n] [--labels-out seg.png] [--json-out report.json] [--config cfg.json]\n\n\
         Segments a grayscale image by graph-cut energy minimization.\n\
         Examples:\n  {program} cells.png --method chanvese --lambda 10 --nb N8 --labels-out seg.png\n  \
         {program} scan.png --method mumford-shah --k 3 --json-out report.json\n"
    )
}

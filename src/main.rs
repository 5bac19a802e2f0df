use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::vector;

use ins_mech::align::{align_coarse_inertial, align_coarse_static_base, align_coarse_wahba};
use ins_mech::attitude::{dcm_to_euler, euler_to_dcm};
use ins_mech::frame::FrameState;
use ins_mech::linalg::Vec3;
use ins_mech::mech::{run_ecef, Compensation, NavState};
use ins_mech::{GpsTime, ImuDataset, ImuSample, WGS84};

#[derive(Parser, Debug)]
#[command(name = "ins_mech")]
#[command(about = "Strapdown INS mechanization and coarse alignment")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mechanize an IMU log from a known initial state, one JSON record per step
    Nav {
        /// IMU log, one `time,ax,ay,az,gx,gy,gz` line of increments per sample
        imu: PathBuf,

        /// Initial state `lat_deg,lon_deg,h,vn,ve,vd,roll_deg,pitch_deg,yaw_deg`
        #[arg(long, allow_hyphen_values = true)]
        init: String,

        /// Samples per mechanization step (1..=5)
        #[arg(long, default_value_t = 1)]
        samples: usize,

        /// Compensate every sample with its predecessor instead
        #[arg(long, conflicts_with = "samples")]
        previous_cycle: bool,
    },
    /// Coarse alignment from a stationary IMU log
    Align {
        imu: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        lat_deg: f64,

        #[arg(long, value_enum, default_value = "static")]
        method: Method,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Method {
    Static,
    Inertial,
    Wahba,
}

fn strip(line: &str) -> String {
    line.chars().filter(|c| !c.is_whitespace()).collect()
}

fn parse_imu_line(line: &str) -> Option<ImuSample> {
    let line = strip(line);
    let mut time = 0.0;
    let mut ax = 0.0;
    let mut ay = 0.0;
    let mut az = 0.0;
    let mut gx = 0.0;
    let mut gy = 0.0;
    let mut gz = 0.0;

    scanf::sscanf!(&line, "{},{},{},{},{},{},{}", time, ax, ay, az, gx, gy, gz).ok()?;
    Some(ImuSample {
        time: GpsTime::from_secs(time),
        gyro: vector![gx, gy, gz],
        accel: vector![ax, ay, az],
    })
}

fn parse_init(line: &str) -> Result<FrameState> {
    let line = strip(line);
    let mut lat: f64 = 0.0;
    let mut lon: f64 = 0.0;
    let mut h = 0.0;
    let mut vn = 0.0;
    let mut ve = 0.0;
    let mut vd = 0.0;
    let mut roll: f64 = 0.0;
    let mut pitch: f64 = 0.0;
    let mut yaw: f64 = 0.0;

    scanf::sscanf!(
        &line,
        "{},{},{},{},{},{},{},{},{}",
        lat,
        lon,
        h,
        vn,
        ve,
        vd,
        roll,
        pitch,
        yaw
    )
    .map_err(|_| anyhow!("malformed initial state '{line}'"))?;

    Ok(FrameState {
        position: vector![lat.to_radians(), lon.to_radians(), h],
        velocity: vector![vn, ve, vd],
        attitude: euler_to_dcm(&vector![
            roll.to_radians(),
            pitch.to_radians(),
            yaw.to_radians()
        ]),
    })
}

/// Reads samples, skipping blank lines, `#` comments and a header line.
fn read_imu(reader: impl BufRead) -> Result<ImuDataset> {
    let mut imu = ImuDataset::new();
    let mut seen_content = false;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_imu_line(trimmed) {
            Some(sample) => imu
                .push(sample)
                .with_context(|| format!("line {}", n + 1))?,
            None if !seen_content => log::debug!("skipping header '{trimmed}'"),
            None => bail!("line {}: malformed IMU sample '{trimmed}'", n + 1),
        }
        seen_content = true;
    }
    log::info!("read {} IMU samples", imu.len());
    Ok(imu)
}

fn open_imu(path: &Path) -> Result<ImuDataset> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_imu(BufReader::new(file))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Nav {
            imu,
            init,
            samples,
            previous_cycle,
        } => {
            let imu = open_imu(&imu)?;
            let init = NavState::from_ned(&WGS84, &parse_init(&init)?);
            let mode = if previous_cycle {
                Compensation::PreviousCycle
            } else {
                Compensation::Subsamples(samples)
            };
            for record in run_ecef(&WGS84, &imu, init, mode)? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Command::Align {
            imu,
            lat_deg,
            method,
        } => {
            let imu = open_imu(&imu)?;
            let lat = lat_deg.to_radians();
            let cbn = match method {
                Method::Static => align_coarse_static_base(&WGS84, &imu, lat)?,
                Method::Inertial => align_coarse_inertial(&WGS84, &imu, lat)?,
                Method::Wahba => {
                    let still = vec![Vec3::zeros(); imu.len()];
                    align_coarse_wahba(&WGS84, &imu, lat, &still, None)?
                }
            };
            let e = dcm_to_euler(&cbn);
            println!(
                "{}",
                serde_json::json!({
                    "roll_deg": e.x.to_degrees(),
                    "pitch_deg": e.y.to_degrees(),
                    "yaw_deg": e.z.to_degrees(),
                })
            );
        }
    }
    Ok(())
}

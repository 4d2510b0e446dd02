use gpiohelper::config::SamplerConfig;
use gpiohelper::drivers::mpu6050::Mpu6050;
use gpiohelper::i2c::I2cBus;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Console sampler: prints raw motion words and the fused orientation until
/// interrupted.
fn main() -> Result<(), Box<dyn Error>> {
    SimpleLogger::new().with_level(LevelFilter::Debug).init()?;

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sampler.json".to_string());
    let config = SamplerConfig::load(&config_path)?;
    info!(
        "using I2C bus {} with sensor at {:#04x}",
        config.i2c_bus, config.sensor_address
    );

    let running = Arc::new(AtomicBool::new(true));
    let interrupt_flag = running.clone();
    ctrlc::set_handler(move || interrupt_flag.store(false, Ordering::SeqCst))?;

    let bus = I2cBus::open(&config.i2c_bus)?;
    let mut sensor = Mpu6050::new(&bus, config.sensor_address);
    sensor.set_upside_down_mounting(config.upside_down_mounting);
    sensor.set_fusion_enabled(config.fusion_enabled);

    if !sensor.init_device() {
        error!("mpu6050 init failed");
        return Err("no usable motion sensor on the bus".into());
    }
    info!("mpu6050 found");

    while running.load(Ordering::SeqCst) {
        match sensor.raw_motion6() {
            Ok(raw) => println!(
                "motion {}\t{}\t{}\t{}\t{}\t{}",
                raw.accel_x, raw.accel_y, raw.accel_z, raw.gyro_x, raw.gyro_y, raw.gyro_z
            ),
            Err(err) => error!("motion read failed: {}", err),
        }

        match sensor.angles() {
            Ok(angles) => println!(
                "angles {:.2}\t{:.2}\t{:.2}",
                angles.angle_x, angles.angle_y, angles.angle_z
            ),
            Err(err) => error!("angle read failed: {}", err),
        }

        thread::sleep(Duration::from_millis(config.sample_interval_ms));
    }

    info!("shutting down");
    Ok(())
}

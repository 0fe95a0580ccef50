use subsume_kinematics::*;

fn main() {
    let wheel_radius = 0.03;
    let wheel_base = 0.15;
    let ticks_per_revolution = 36;
    let geometry_result = DriveGeometry::new(wheel_radius, wheel_base, ticks_per_revolution, 0.01, 0.05);

    let inputs = DriveInputs::new(0.8, 0.0); // 0.8 m/s forward, no turn
    let dt = 0.05; // Control period in seconds
    let num_steps = 10;

    match geometry_result {
        Ok(geometry) => {
            println!("Initializing simulation...");
            println!("  {}", geometry);
            println!("    Meters per tick: {:.5} m", geometry.meters_per_tick());
            println!("    Velocity max:    {:.2} m/s", geometry.velocity_max());

            let wheels = DifferentialDriveInputs::compute(inputs, &geometry);
            println!("  Command:  {}", inputs);
            println!("  Wheels:   {}", wheels);
            println!("\nSimulating...");

            let mut odometry = DifferentialDriveOdometry::new(&geometry);
            let mut pose = Pose::default();
            let mut left_ticks = 0.0;
            let mut right_ticks = 0.0;
            odometry.process(EncoderTicks::new(0, 0));

            for i in 0..num_steps {
                left_ticks += wheels.velocity_left_wheel * dt / geometry.meters_per_tick();
                right_ticks += wheels.velocity_right_wheel * dt / geometry.meters_per_tick();
                let reading = EncoderTicks::new(left_ticks as i64, right_ticks as i64);

                let displacement = odometry.process(reading);
                displacement.apply_to(&mut pose);
                println!("Step {:>2}: ticks {:?} {} Pose: {}", i + 1, reading, displacement, pose);
            }

            println!("\nSimulation complete.");
            println!("Final Pose: {:?}", pose);
        }
        Err(e) => {
            eprintln!("Failed to initialize geometry: {}", e);
        }
    }
}

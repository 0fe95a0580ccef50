use subsume_behavior::{FnTask, Step, SubsumptionTaskDispatcher, TaskError};
use subsume_kinematics::{DifferentialDriveOdometry, DriveGeometry, DriveInputs, Pose};
use subsume_motor::{DifferentialDrive, MotorSpeeds, SimulatedDriveBase, Transmission};

const EPSILON: f64 = 1e-9;
const DT: f64 = 0.05;

#[derive(Default)]
struct Ctx {
    claim: Option<DriveInputs>,
}

impl Ctx {
    fn claim(&mut self, inputs: DriveInputs) {
        if self.claim.is_none() {
            self.claim = Some(inputs);
        }
    }
}

fn geometry() -> DriveGeometry {
    DriveGeometry::new(0.03, 0.15, 36, 0.01, 0.05).unwrap()
}

/// Claims `inputs` for `ticks` ticks, then finishes.
fn timed(name: &str, inputs: DriveInputs, ticks: u32) -> FnTask<Ctx> {
    FnTask::new(name, move || {
        let mut left = ticks;
        Box::new(move |ctx: &mut Ctx| -> Result<Step<Ctx>, TaskError> {
            if left == 0 {
                return Ok(Step::Done);
            }
            left -= 1;
            ctx.claim(inputs);
            Ok(Step::Continue)
        })
    })
}

fn run_tick(
    dispatcher: &mut SubsumptionTaskDispatcher<Ctx>,
    drive: &mut DifferentialDrive<SimulatedDriveBase>,
) -> bool {
    let mut ctx = Ctx::default();
    let active = dispatcher.process(&mut ctx).unwrap();
    drive.set_inputs(ctx.claim.unwrap_or(DriveInputs::STOP));
    drive.drive().unwrap();
    active
}

#[test]
fn test_higher_priority_task_wins_the_drive() {
    let base = SimulatedDriveBase::new(geometry());
    let mut drive = DifferentialDrive::new(geometry(), base.clone());
    drive.set_enabled(true).unwrap();

    let mut dispatcher = SubsumptionTaskDispatcher::default();
    dispatcher
        .dispatch(Box::new(timed("reverse", DriveInputs::new(-0.5, 0.0), 2)))
        .unwrap();
    dispatcher
        .dispatch(Box::new(timed("forward", DriveInputs::new(0.5, 0.0), 5)))
        .unwrap();

    run_tick(&mut dispatcher, &mut drive);
    assert_eq!(base.applied_speeds(), MotorSpeeds::new(-62, -62));
    run_tick(&mut dispatcher, &mut drive);
    run_tick(&mut dispatcher, &mut drive);
    assert_eq!(base.applied_speeds(), MotorSpeeds::new(62, 62));

    while run_tick(&mut dispatcher, &mut drive) {}
    assert_eq!(base.applied_speeds(), MotorSpeeds::STOP);
    assert_eq!(
        base.history(),
        [
            Transmission::Drive(MotorSpeeds::new(-62, -62)),
            Transmission::Drive(MotorSpeeds::new(62, 62)),
            Transmission::Drive(MotorSpeeds::STOP),
        ]
    );
}

#[test]
fn test_delegated_sub_task_drives_within_the_same_tick() {
    let base = SimulatedDriveBase::new(geometry());
    let mut drive = DifferentialDrive::new(geometry(), base.clone());
    drive.set_enabled(true).unwrap();

    let mut dispatcher = SubsumptionTaskDispatcher::default();
    dispatcher
        .dispatch(Box::new(FnTask::new("parent", || {
            let mut delegated = false;
            Box::new(move |_: &mut Ctx| -> Result<Step<Ctx>, TaskError> {
                if delegated {
                    return Ok(Step::Done);
                }
                delegated = true;
                Ok(Step::delegate(timed("spin", DriveInputs::new(0.0, 3.0), 1)))
            })
        })))
        .unwrap();

    run_tick(&mut dispatcher, &mut drive);
    let spinning = base.applied_speeds();
    assert!(spinning.left < 0 && spinning.right > 0);
    assert_eq!(spinning.left, -spinning.right);
}

#[test]
fn test_closed_loop_drive_straight_tracks_simulated_pose() {
    let base = SimulatedDriveBase::new(geometry());
    let mut drive = DifferentialDrive::new(geometry(), base.clone());
    drive.set_enabled(true).unwrap();
    let mut odometry = DifferentialDriveOdometry::new(&geometry());
    let mut pose = Pose::default();

    let mut dispatcher = SubsumptionTaskDispatcher::default();
    dispatcher
        .dispatch(Box::new(timed("forward", DriveInputs::new(0.5, 0.0), 40)))
        .unwrap();

    odometry.process(base.encoder_ticks());
    while run_tick(&mut dispatcher, &mut drive) {
        base.step(DT);
        odometry.process(base.encoder_ticks()).apply_to(&mut pose);
    }

    // 40 ticks at 0.62 m/s for 50 ms each, quantised to whole encoder ticks
    let expected = 40.0 * DT * 0.62;
    assert!((pose.x - expected).abs() < geometry().meters_per_tick() + EPSILON);
    assert!(pose.y.abs() < EPSILON);
    assert!(pose.theta.abs() < EPSILON);
}

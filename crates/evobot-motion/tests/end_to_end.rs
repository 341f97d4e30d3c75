//! 整链路集成测试
//!
//! 用内存串口把控制器、插值器、传输层和协议层串起来：上位机发出的
//! 每一帧都从 mock 链路取回并解码验证，固件反馈用手工构造的状态帧
//! 注入。

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use evobot_kinematics::{KinematicsSolver, RobotModel};
use evobot_motion::{
    ArmConfig, ArmEvent, DeviceMonitor, EventBus, IdentityCalibration, InterpolationKind,
    MonitorConfig, MotionController, MotionError, SafetyLevel,
};
use evobot_protocol::{FrameAssembler, FrameCodec, JOINT_COUNT};
use evobot_serial::mock::{MockLinkFactory, MockPort};
use evobot_serial::{SerialConfig, SerialTransport};

fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

struct Stack {
    port: MockPort,
    transport: Arc<SerialTransport>,
    controller: MotionController,
    rx: Receiver<ArmEvent>,
}

fn build_stack() -> Stack {
    let port = MockPort::new();
    let factory = Arc::new(MockLinkFactory::new(port.clone()));
    let transport = Arc::new(SerialTransport::new(factory, SerialConfig::default()));
    let events = Arc::new(EventBus::new());
    let rx = events.subscribe();

    let solver = Arc::new(KinematicsSolver::new(RobotModel::default()));
    let controller = MotionController::new(
        ArmConfig::default(),
        Arc::clone(&transport),
        solver,
        Arc::new(IdentityCalibration),
        Arc::clone(&events),
    )
    .unwrap();

    Stack {
        port,
        transport,
        controller,
        rx,
    }
}

/// 手腕板状态帧（关节 0-5）
fn wrist_frame(positions: [u16; 6], currents: [u16; 6]) -> Vec<u8> {
    let mut payload = vec![0x00, 0x2C, 0x02, 0x01, 0x00, 0x74];
    for i in 0..6 {
        payload.extend_from_slice(&positions[i].to_be_bytes());
        payload.extend_from_slice(&0u16.to_be_bytes());
        payload.extend_from_slice(&currents[i].to_be_bytes());
    }
    payload.extend_from_slice(&600u16.to_be_bytes());
    FrameCodec::encode(&payload)
}

/// 手臂板状态帧（关节 6-9）
fn arm_frame(positions: [u16; 4]) -> Vec<u8> {
    let mut payload = vec![0x00, 0x20, 0x02, 0x01, 0x00, 0x73];
    for p in positions {
        payload.extend_from_slice(&p.to_be_bytes());
        payload.extend_from_slice(&0u16.to_be_bytes());
        payload.extend_from_slice(&200u16.to_be_bytes());
    }
    payload.extend_from_slice(&800u16.to_be_bytes());
    FrameCodec::encode(&payload)
}

/// 注入两块板卡的反馈，把全部关节位置置为 `position`
fn feed_positions(stack: &Stack, position: u16) {
    stack.port.inject(&wrist_frame([position; 6], [100; 6]));
    stack.port.inject(&arm_frame([position; 4]));
}

/// 从写出的字节流里解出所有位置控制指令
fn decode_position_commands(bytes: &[u8]) -> Vec<[i32; JOINT_COUNT]> {
    let mut assembler = FrameAssembler::new();
    let mut commands = Vec::new();
    for raw in assembler.feed(bytes) {
        let payload = FrameCodec::decode(&raw).unwrap();
        if payload[5] == 0x71 {
            commands.push(std::array::from_fn(|i| {
                i32::from(u16::from_be_bytes([payload[6 + 4 * i], payload[7 + 4 * i]]))
            }));
        }
    }
    commands
}

#[test]
fn test_move_to_emits_exact_command_sequence() {
    let stack = build_stack();
    stack.transport.connect().unwrap();

    feed_positions(&stack, 1500);
    assert!(wait_for(
        || stack.controller.current_positions() == [1500; JOINT_COUNT],
        Duration::from_secs(2)
    ));
    stack.port.take_written();

    let target = [2000, 1800, 1000, 1200, 1500, 2000, 1800, 1500, 1000, 1200];
    stack
        .controller
        .move_to(target, Some(2.0), Some(InterpolationKind::Trapezoidal))
        .unwrap();

    assert!(wait_for(
        || !stack.controller.is_moving(),
        Duration::from_secs(5)
    ));
    // 最后一帧可能还在发送队列里
    assert!(wait_for(
        || decode_position_commands(&stack.port.written()).len() >= 21,
        Duration::from_secs(1)
    ));

    // 2.0s × 10Hz → 正好 21 帧位置指令，首帧在起点，末帧在目标
    let commands = decode_position_commands(&stack.port.written());
    assert_eq!(commands.len(), 21);
    assert_eq!(commands[0], [1500; JOINT_COUNT]);
    assert_eq!(commands[20], target);
    assert_eq!(stack.controller.status().progress, 1.0);

    let received: Vec<_> = stack.rx.try_iter().collect();
    assert!(
        received
            .iter()
            .any(|e| matches!(e, ArmEvent::TrajectoryStarted { points: 21, .. }))
    );
    assert!(
        received
            .iter()
            .any(|e| matches!(e, ArmEvent::TrajectoryCompleted { .. }))
    );
}

#[test]
fn test_move_rejected_when_disconnected() {
    let stack = build_stack();
    let result = stack.controller.move_to([1500; JOINT_COUNT], None, None);
    assert!(matches!(result, Err(MotionError::NotConnected)));
}

#[test]
fn test_soft_limit_rejection_names_joint() {
    let stack = build_stack();
    stack.transport.connect().unwrap();

    let mut target = [1500; JOINT_COUNT];
    target[5] = 3500;
    let error = stack.controller.move_to(target, None, None).unwrap_err();
    match error {
        MotionError::SoftLimit { name, position, .. } => {
            assert_eq!(name, "wrist");
            assert_eq!(position, 3500);
        },
        other => panic!("unexpected error: {other:?}"),
    }
    // 被拒绝的指令不产生任何输出
    assert!(decode_position_commands(&stack.port.written()).is_empty());
}

#[test]
fn test_move_joint_validates_index() {
    let stack = build_stack();
    stack.transport.connect().unwrap();
    let result = stack.controller.move_joint(10, 1500, None);
    assert!(matches!(
        result,
        Err(MotionError::InvalidJoint { joint: 10 })
    ));
}

#[test]
fn test_telemetry_updates_snapshot_and_flags_overcurrent() {
    let stack = build_stack();
    stack.transport.connect().unwrap();

    let mut currents = [100; 6];
    currents[1] = 2000; // 超过默认 1500mA 阈值
    stack.port.inject(&wrist_frame([1200; 6], currents));

    assert!(wait_for(
        || stack.controller.status().currents[1] == 2000,
        Duration::from_secs(2)
    ));
    assert_eq!(stack.controller.status().positions[1], 1200);
    assert_eq!(stack.controller.safety_level(), SafetyLevel::Warning);

    let received: Vec<_> = stack.rx.try_iter().collect();
    assert!(
        received
            .iter()
            .any(|e| matches!(e, ArmEvent::Telemetry(_)))
    );
    assert!(received.iter().any(|e| matches!(
        e,
        ArmEvent::Alert {
            joint: Some(1),
            ..
        }
    )));
}

#[test]
fn test_emergency_stop_latches_until_reset() {
    let stack = build_stack();
    stack.transport.connect().unwrap();
    feed_positions(&stack, 1500);
    assert!(wait_for(
        || stack.controller.current_positions() == [1500; JOINT_COUNT],
        Duration::from_secs(2)
    ));

    stack
        .controller
        .move_to([2500; JOINT_COUNT], Some(3.0), None)
        .unwrap();
    assert!(wait_for(
        || stack.controller.is_moving(),
        Duration::from_secs(1)
    ));

    stack.controller.emergency_stop();
    assert!(wait_for(
        || !stack.controller.is_moving(),
        Duration::from_secs(1)
    ));
    assert_eq!(stack.controller.safety_level(), SafetyLevel::Emergency);

    // 锁存期间拒绝运动
    let result = stack.controller.move_to([1500; JOINT_COUNT], None, None);
    assert!(matches!(result, Err(MotionError::EmergencyLatched)));

    stack.controller.reset_safety().unwrap();
    assert_eq!(stack.controller.safety_level(), SafetyLevel::Normal);
    stack
        .controller
        .move_to([1600; JOINT_COUNT], Some(0.2), None)
        .unwrap();
    assert!(wait_for(
        || !stack.controller.is_moving(),
        Duration::from_secs(2)
    ));

    let received: Vec<_> = stack.rx.try_iter().collect();
    assert!(received.iter().any(|e| matches!(e, ArmEvent::EmergencyStop)));
}

#[test]
fn test_monitor_alternates_board_queries() {
    let port = MockPort::new();
    let factory = Arc::new(MockLinkFactory::new(port.clone()));
    let transport = Arc::new(SerialTransport::new(factory, SerialConfig::default()));
    let events = Arc::new(EventBus::new());
    transport.connect().unwrap();

    let monitor = DeviceMonitor::new(
        Arc::clone(&transport),
        events,
        MonitorConfig {
            query_interval_ms: 20,
            ..MonitorConfig::default()
        },
    );
    monitor.start().unwrap();

    assert!(wait_for(
        || {
            let mut assembler = FrameAssembler::new();
            assembler.feed(&port.written()).len() >= 4
        },
        Duration::from_secs(2)
    ));
    monitor.stop();
    assert!(!monitor.is_running());
    assert!(monitor.stats().queries_sent >= 4);

    let mut assembler = FrameAssembler::new();
    let boards: Vec<u8> = assembler
        .feed(&port.written())
        .iter()
        .map(|raw| {
            let payload = FrameCodec::decode(raw).unwrap();
            assert_eq!(payload[5], 0x72);
            payload[6]
        })
        .collect();

    // 手臂板 / 手腕板交替
    for pair in boards.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }
    assert!(boards.contains(&0x01));
    assert!(boards.contains(&0x02));
}

#[test]
fn test_mode_change_blocked_while_moving() {
    let stack = build_stack();
    stack.transport.connect().unwrap();
    feed_positions(&stack, 1500);
    assert!(wait_for(
        || stack.controller.current_positions() == [1500; JOINT_COUNT],
        Duration::from_secs(2)
    ));

    stack
        .controller
        .move_to([2000; JOINT_COUNT], Some(2.0), None)
        .unwrap();
    assert!(wait_for(
        || stack.controller.is_moving(),
        Duration::from_secs(1)
    ));

    let result = stack
        .controller
        .set_mode(evobot_motion::ControlMode::Teaching);
    assert!(matches!(result, Err(MotionError::TrajectoryActive)));

    stack.controller.stop();
    stack
        .controller
        .set_mode(evobot_motion::ControlMode::Teaching)
        .unwrap();

    let received: Vec<_> = stack.rx.try_iter().collect();
    assert!(
        received
            .iter()
            .any(|e| matches!(e, ArmEvent::ModeChanged { .. }))
    );
}

use deskmotion::{Command, ProtocolError};

#[test]
fn commands_encode_to_fixed_frames() {
    let expected: [(Command, [u8; 8]); 7] = [
        (Command::WakeUp, [0x9B, 0x06, 0x02, 0x00, 0x00, 0x6C, 0xA1, 0x9D]),
        (Command::Up, [0x9B, 0x06, 0x02, 0x01, 0x00, 0xFC, 0xA0, 0x9D]),
        (Command::Down, [0x9B, 0x06, 0x02, 0x02, 0x00, 0x0C, 0xA0, 0x9D]),
        (Command::Preset1, [0x9B, 0x06, 0x02, 0x04, 0x00, 0xAC, 0xA3, 0x9D]),
        (Command::Preset2, [0x9B, 0x06, 0x02, 0x08, 0x00, 0xAC, 0xA6, 0x9D]),
        (Command::Sitting, [0x9B, 0x06, 0x02, 0x00, 0x01, 0xAC, 0x60, 0x9D]),
        (Command::Standing, [0x9B, 0x06, 0x02, 0x10, 0x00, 0xAC, 0xAC, 0x9D]),
    ];
    for (command, bytes) in expected {
        assert_eq!(command.frame(), bytes, "frame mismatch for {command}");
    }
}

#[test]
fn encoding_is_stable_across_calls() {
    for command in Command::ALL {
        assert_eq!(command.frame(), command.frame());
    }
}

#[test]
fn frames_share_the_fixed_envelope() {
    for command in Command::ALL {
        let frame = command.frame();
        assert_eq!(frame[0], 0x9B);
        assert_eq!(frame[1], 0x06);
        assert_eq!(frame[7], 0x9D);
    }
}

#[test]
fn wire_names_round_trip() {
    for command in Command::ALL {
        assert_eq!(Command::from_name(command.name()).unwrap(), command);
    }
    assert_eq!(Command::from_name("UP").unwrap(), Command::Up);
    assert_eq!("PRESET2".parse::<Command>().unwrap(), Command::Preset2);
}

#[test]
fn unknown_name_is_rejected() {
    match Command::from_name("SIDEWAYS") {
        Err(ProtocolError::UnknownCommand(name)) => assert_eq!(name, "SIDEWAYS"),
        other => panic!("expected UnknownCommand, got {other:?}"),
    }
}

// Message encoding through the framing layer, as a client would see it.

use std::io::Cursor;

use waypoint_protocol::{
    ClientMessage, MissionInfo, PROTOCOL_VERSION, PlayerId, ServerMessage, StatusReport, recv,
    send,
};

#[test]
fn a_client_session_reads_back_intact() {
    let outgoing = vec![
        ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            player_name: "Ranger".into(),
            ai_controlled: false,
        },
        ClientMessage::LoadMission {
            mission: "outpost.mis".into(),
        },
        ClientMessage::RequestStatus,
        ClientMessage::Goodbye,
    ];
    let mut wire = Vec::new();
    for msg in &outgoing {
        send(&mut wire, msg).unwrap();
    }

    let mut cursor = Cursor::new(wire);
    for expected in &outgoing {
        let got: ClientMessage = recv(&mut cursor).unwrap();
        assert_eq!(&got, expected);
    }
}

#[test]
fn server_notifications_carry_their_payloads() {
    let welcome = ServerMessage::Welcome {
        client_id: PlayerId(4),
        host: true,
        status: StatusReport {
            mission_path: Some("outpost.mis".into()),
            sequence: 3,
            crc: Some(0xCBF4_3926),
            running: true,
            state: "Running".into(),
        },
    };
    let info = ServerMessage::MissionInfo {
        info: MissionInfo {
            mission_path: "ridge.mis".into(),
            name: "Ridge".into(),
            description: vec!["Hold it.".into()],
        },
    };
    let mut wire = Vec::new();
    send(&mut wire, &welcome).unwrap();
    send(&mut wire, &info).unwrap();
    send(&mut wire, &ServerMessage::ClearCenterPrint).unwrap();

    let mut cursor = Cursor::new(wire);
    assert_eq!(recv::<_, ServerMessage>(&mut cursor).unwrap(), welcome);
    assert_eq!(recv::<_, ServerMessage>(&mut cursor).unwrap(), info);
    assert_eq!(
        recv::<_, ServerMessage>(&mut cursor).unwrap(),
        ServerMessage::ClearCenterPrint
    );
}

#[test]
fn only_mission_control_requests_are_host_only() {
    assert!(ClientMessage::EndMission.is_host_only());
    assert!(ClientMessage::CycleMission.is_host_only());
    assert!(ClientMessage::ResetMission.is_host_only());
    assert!(
        ClientMessage::LoadMission {
            mission: "a.mis".into()
        }
        .is_host_only()
    );
    assert!(!ClientMessage::RequestStatus.is_host_only());
    assert!(!ClientMessage::Goodbye.is_host_only());
}

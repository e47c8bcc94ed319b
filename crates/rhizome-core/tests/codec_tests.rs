//! OSC codec tests

use bytes::Bytes;
use rhizome_core::{codec, Arg, Error};
use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType};

#[test]
fn test_all_supported_types() {
    let args = vec![
        Arg::Int(-3),
        Arg::Float(0.5),
        Arg::String("feeling".into()),
        Arg::Bool(true),
        Arg::Bool(false),
        Arg::Blob(Bytes::from_static(b"tyutyu")),
    ];
    let data = codec::encode("/bly", &args).unwrap();
    let msg = codec::decode(&data).unwrap();
    assert_eq!(msg.address, "/bly");
    assert_eq!(msg.args, args);
}

#[test]
fn test_empty_args() {
    let data = codec::encode("/bli", &[]).unwrap();
    let msg = codec::decode(&data).unwrap();
    assert!(msg.args.is_empty());
}

#[test]
fn test_bundle_is_flattened() {
    let packet = OscPacket::Bundle(OscBundle {
        timetag: OscTime {
            seconds: 0,
            fractional: 1,
        },
        content: vec![
            OscPacket::Message(OscMessage {
                addr: "/a".to_string(),
                args: vec![OscType::Int(1)],
            }),
            OscPacket::Bundle(OscBundle {
                timetag: OscTime {
            seconds: 0,
            fractional: 1,
        },
                content: vec![OscPacket::Message(OscMessage {
                    addr: "/b".to_string(),
                    args: vec![OscType::String("x".into())],
                })],
            }),
        ],
    });
    let data = rosc::encoder::encode(&packet).unwrap();

    let messages = codec::decode_packet(&data).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].address, "/a");
    assert_eq!(messages[1].address, "/b");

    // Single-message decode refuses bundles
    assert!(codec::decode(&data).is_err());
}

#[test]
fn test_unsupported_type_in_bundle_fails_whole_packet() {
    let packet = OscPacket::Bundle(OscBundle {
        timetag: OscTime {
            seconds: 0,
            fractional: 1,
        },
        content: vec![OscPacket::Message(OscMessage {
            addr: "/a".to_string(),
            args: vec![OscType::Nil],
        })],
    });
    let data = rosc::encoder::encode(&packet).unwrap();
    assert!(matches!(
        codec::decode_packet(&data),
        Err(Error::UnsupportedArgument(_))
    ));
}

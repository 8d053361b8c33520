use std::io::Cursor;
use std::path::PathBuf;

use pipekv::protocol::{
    ConnectRequest, Notification, OpCode, Request, Response, ResultCode, CONNECT_PAYLOAD_LEN,
    KEY_FIELD_LEN, NOTIFICATION_LEN, RESPONSE_LEN,
};
use pipekv::{KvsError, Result};

#[test]
fn connect_request_layout() -> Result<()> {
    let request = Request::Connect(ConnectRequest {
        request: PathBuf::from("/tmp/req1"),
        response: PathBuf::from("/tmp/resp1"),
        notification: PathBuf::from("/tmp/notif1"),
    });
    let frame = request.encode()?;

    assert_eq!(frame.len(), 1 + CONNECT_PAYLOAD_LEN);
    assert_eq!(frame[0], 1);
    assert_eq!(&frame[1..10], b"/tmp/req1");
    assert!(frame[10..41].iter().all(|&b| b == 0));
    assert_eq!(&frame[41..51], b"/tmp/resp1");
    assert_eq!(&frame[81..92], b"/tmp/notif1");

    let decoded = Request::read_from(&mut Cursor::new(frame))?;
    assert_eq!(decoded, Some(request));
    Ok(())
}

#[test]
fn subscribe_request_layout() -> Result<()> {
    let frame = Request::Subscribe { key: "alpha".to_owned() }.encode()?;
    assert_eq!(frame.len(), 1 + KEY_FIELD_LEN);
    assert_eq!(frame[0], OpCode::Subscribe as u8);
    assert_eq!(&frame[1..6], b"alpha");
    assert!(frame[6..].iter().all(|&b| b == 0));

    let frame = Request::Unsubscribe { key: "alpha".to_owned() }.encode()?;
    assert_eq!(frame[0], 4);
    assert_eq!(
        Request::read_from(&mut Cursor::new(frame))?,
        Some(Request::Unsubscribe { key: "alpha".to_owned() })
    );
    Ok(())
}

#[test]
fn disconnect_is_a_single_byte() -> Result<()> {
    assert_eq!(Request::Disconnect.encode()?, vec![2]);
    assert_eq!(
        Request::read_from(&mut Cursor::new(vec![2]))?,
        Some(Request::Disconnect)
    );
    Ok(())
}

#[test]
fn several_requests_in_one_stream() -> Result<()> {
    let mut bytes = Request::Subscribe { key: "a".to_owned() }.encode()?;
    bytes.extend(Request::Disconnect.encode()?);
    let mut reader = Cursor::new(bytes);

    assert_eq!(
        Request::read_from(&mut reader)?,
        Some(Request::Subscribe { key: "a".to_owned() })
    );
    assert_eq!(Request::read_from(&mut reader)?, Some(Request::Disconnect));
    assert_eq!(Request::read_from(&mut reader)?, None);
    Ok(())
}

#[test]
fn unknown_opcode() -> Result<()> {
    assert_eq!(
        Request::read_from(&mut Cursor::new(vec![9]))?,
        Some(Request::Unknown(9))
    );
    Ok(())
}

#[test]
fn truncated_payload_is_a_protocol_error() {
    let mut frame = vec![OpCode::Subscribe as u8];
    frame.extend_from_slice(b"abc");
    assert!(matches!(
        Request::read_from(&mut Cursor::new(frame)),
        Err(KvsError::Protocol(_))
    ));
}

#[test]
fn oversize_fields_are_rejected() {
    let key = "k".repeat(41);
    assert!(matches!(
        Request::Subscribe { key }.encode(),
        Err(KvsError::TooLong { what: "key", .. })
    ));

    let request = Request::Connect(ConnectRequest {
        request: PathBuf::from(format!("/tmp/{}", "r".repeat(40))),
        response: PathBuf::from("/tmp/resp"),
        notification: PathBuf::from("/tmp/notif"),
    });
    assert!(matches!(request.encode(), Err(KvsError::TooLong { what: "path", .. })));
}

#[test]
fn response_bytes() -> Result<()> {
    let ok = Response::new(OpCode::Connect, ResultCode::Success);
    assert_eq!(ok.encode(), [b'1', b'0', 0]);

    let refused = Response::new(OpCode::Subscribe, ResultCode::from(false));
    assert_eq!(refused.encode(), [b'3', b'1', 0]);

    let mut buf = Vec::new();
    Response::new(OpCode::Disconnect, ResultCode::Success).write_to(&mut buf)?;
    assert_eq!(buf.len(), RESPONSE_LEN);
    assert_eq!(
        Response::read_from(&mut Cursor::new(buf))?,
        Response::new(OpCode::Disconnect, ResultCode::Success)
    );
    Ok(())
}

#[test]
fn malformed_responses() {
    assert!(matches!(Response::decode(&[b'7', b'0', 0]), Err(KvsError::Protocol(_))));
    assert!(matches!(Response::decode(&[b'1', b'x', 0]), Err(KvsError::Protocol(_))));
}

#[test]
fn notification_layout() -> Result<()> {
    let frame = Notification::new("key", "value").encode()?;
    assert_eq!(frame.len(), NOTIFICATION_LEN);

    assert_eq!(&frame[..3], b"key");
    assert!(frame[3..40].iter().all(|&b| b == b' '));
    assert_eq!(frame[40], 0);
    assert_eq!(&frame[41..46], b"value");
    assert!(frame[46..81].iter().all(|&b| b == b' '));
    assert_eq!(frame[81], 0);

    let decoded = Notification::read_from(&mut Cursor::new(frame))?;
    assert_eq!(decoded, Notification::new("key", "value"));
    assert_eq!(decoded.to_string(), "(key,value)");
    Ok(())
}

#[test]
fn notification_keeps_inner_spaces() -> Result<()> {
    let frame = Notification::new("a b", "c d").encode()?;
    let decoded = Notification::read_from(&mut Cursor::new(frame))?;
    assert_eq!(decoded, Notification::new("a b", "c d"));
    Ok(())
}

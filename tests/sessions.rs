use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError};
use crossbeam_utils::thread::scope;
use pipekv::protocol::{ConnectRequest, OpCode, Request, Response, ResultCode};
use pipekv::{
    Connection, KvStore, KvsEngine, KvsError, Result, Session, SessionChannel, SessionManager,
    SlotPool, SlotState,
};

/// replays a fixed list of requests and records every response
struct ScriptedChannel {
    requests: VecDeque<Request>,
    responses: Arc<Mutex<Vec<Response>>>,
    // responses to this operation cannot be delivered
    broken: Option<OpCode>,
}

impl ScriptedChannel {
    fn new(requests: Vec<Request>) -> (Self, Arc<Mutex<Vec<Response>>>) {
        let responses = Arc::new(Mutex::new(Vec::new()));
        let channel = ScriptedChannel {
            requests: requests.into(),
            responses: Arc::clone(&responses),
            broken: None,
        };
        (channel, responses)
    }

    fn failing_on(requests: Vec<Request>, op: OpCode) -> (Self, Arc<Mutex<Vec<Response>>>) {
        let (mut channel, responses) = ScriptedChannel::new(requests);
        channel.broken = Some(op);
        (channel, responses)
    }
}

impl SessionChannel for ScriptedChannel {
    fn next_request(&mut self) -> Result<Option<Request>> {
        match self.requests.pop_front() {
            Some(request) => Ok(Some(request)),
            None => Err(KvsError::StringErr("script exhausted".to_owned())),
        }
    }

    fn respond(&mut self, response: Response) -> Result<()> {
        if self.broken == Some(response.op) {
            return Err(KvsError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "no reader on the response pipe",
            )));
        }
        self.responses.lock().unwrap().push(response);
        Ok(())
    }
}

fn session(id: &str) -> Session {
    Session::new(ConnectRequest {
        request: PathBuf::from(format!("/tmp/req{}", id)),
        response: PathBuf::from(format!("/tmp/resp{}", id)),
        notification: PathBuf::from(format!("/tmp/notif{}", id)),
    })
}

fn ok(op: OpCode) -> Response {
    Response::new(op, ResultCode::Success)
}

fn failed(op: OpCode) -> Response {
    Response::new(op, ResultCode::Failure)
}

#[test]
fn slot_pool_hands_out_every_id_once() -> Result<()> {
    let pool = SlotPool::new(3)?;
    let a = pool.acquire();
    let b = pool.acquire();
    let c = pool.acquire();
    let mut ids = vec![a.id(), b.id(), c.id()];
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2]);

    assert_eq!(pool.available(), 0);
    assert!(pool.try_acquire().is_none());

    let freed = b.id();
    drop(b);
    assert_eq!(pool.available(), 1);
    assert_eq!(pool.try_acquire().map(|guard| guard.id()), Some(freed));
    Ok(())
}

#[test]
fn slot_pool_needs_a_capacity() {
    assert!(matches!(SlotPool::new(0), Err(KvsError::Parsing(_))));
    assert!(matches!(SessionManager::new(0), Err(KvsError::Parsing(_))));
}

#[test]
fn admit_blocks_until_a_slot_is_released() -> Result<()> {
    let sessions = SessionManager::new(2)?;
    let first = sessions.admit()?;
    let _second = sessions.admit()?;
    assert!(sessions.try_admit()?.is_none());

    scope(|s| {
        let waiter = s.spawn(|_| sessions.admit().map(|slot| slot.id()));
        thread::sleep(Duration::from_millis(100));
        let freed = first.id();
        drop(first);
        assert_eq!(waiter.join().unwrap().unwrap(), freed);
    })
    .unwrap();
    Ok(())
}

#[test]
fn slot_states_follow_the_session() -> Result<()> {
    let sessions = SessionManager::new(2)?;
    assert_eq!(sessions.states()?, vec![SlotState::Free, SlotState::Free]);

    let mut slot = sessions.admit()?;
    let id = slot.id();
    assert_eq!(sessions.states()?[id], SlotState::Reserved);
    assert_eq!(sessions.active_sessions()?, 0);

    slot.activate("req1")?;
    assert_eq!(sessions.states()?[id], SlotState::Active("req1".to_owned()));
    assert_eq!(sessions.active_sessions()?, 1);

    drop(slot);
    assert_eq!(sessions.states()?[id], SlotState::Free);
    assert_eq!(sessions.active_sessions()?, 0);
    Ok(())
}

#[test]
fn one_active_session_per_identity() -> Result<()> {
    let sessions = SessionManager::new(3)?;
    let mut first = sessions.admit()?;
    first.activate("req1")?;

    let mut second = sessions.admit()?;
    assert!(matches!(second.activate("req1"), Err(KvsError::SessionActive(_))));
    assert_eq!(sessions.states()?[second.id()], SlotState::Reserved);
    second.activate("req2")?;

    // the identity can come back once its session is gone
    drop(first);
    let mut third = sessions.admit()?;
    third.activate("req1")?;
    assert_eq!(sessions.active_sessions()?, 2);
    Ok(())
}

#[test]
fn session_identity_and_endpoint() {
    let session = session("7");
    assert_eq!(session.identity, "req7");
    assert_eq!(session.endpoint(), "/tmp/notif7");
}

#[test]
fn connection_handles_a_whole_session() -> Result<()> {
    let store = KvStore::new();
    store.write("a".to_owned(), "1".to_owned())?;
    store.write("b".to_owned(), "2".to_owned())?;
    let sessions = SessionManager::new(1)?;

    let (channel, responses) = ScriptedChannel::new(vec![
        Request::Subscribe { key: "a".to_owned() },
        Request::Subscribe { key: "a".to_owned() },
        Request::Subscribe { key: "missing".to_owned() },
        Request::Subscribe { key: "b".to_owned() },
        Request::Unknown(42),
        Request::Unsubscribe { key: "b".to_owned() },
        Request::Unsubscribe { key: "b".to_owned() },
        Request::Unsubscribe { key: "missing".to_owned() },
        Request::Disconnect,
    ]);
    let connection = Connection::handshake(store.clone(), session("1"), sessions.admit()?, channel)?;
    assert_eq!(connection.session().identity, "req1");
    assert_eq!(sessions.active_sessions()?, 1);

    connection.serve();

    assert_eq!(
        *responses.lock().unwrap(),
        vec![
            ok(OpCode::Connect),
            ok(OpCode::Subscribe),
            ok(OpCode::Subscribe),
            failed(OpCode::Subscribe),
            ok(OpCode::Subscribe),
            ok(OpCode::Unsubscribe),
            ok(OpCode::Unsubscribe),
            failed(OpCode::Unsubscribe),
            ok(OpCode::Disconnect),
        ]
    );
    // disconnect dropped every subscription and freed the slot
    assert_eq!(store.subscribers("a")?, Some(vec![]));
    assert_eq!(store.subscribers("b")?, Some(vec![]));
    assert_eq!(sessions.states()?, vec![SlotState::Free]);
    Ok(())
}

#[test]
fn duplicate_identity_is_refused() -> Result<()> {
    let store = KvStore::new();
    let sessions = SessionManager::new(2)?;

    let (channel, _) = ScriptedChannel::new(vec![]);
    let _first = Connection::handshake(store.clone(), session("1"), sessions.admit()?, channel)?;

    let (channel, responses) = ScriptedChannel::new(vec![]);
    let second = Connection::handshake(store, session("1"), sessions.admit()?, channel);
    assert!(matches!(second, Err(KvsError::SessionActive(_))));
    assert_eq!(*responses.lock().unwrap(), vec![failed(OpCode::Connect)]);

    // the refused handshake gave its slot back
    assert_eq!(sessions.active_sessions()?, 1);
    assert!(sessions.try_admit()?.is_some());
    Ok(())
}

#[test]
fn disconnect_only_removes_own_subscriptions() -> Result<()> {
    let store = KvStore::new();
    store.write("a".to_owned(), "1".to_owned())?;
    store.subscribe("a", "/tmp/notif2")?;
    let sessions = SessionManager::new(2)?;

    let (channel, _) = ScriptedChannel::new(vec![
        Request::Subscribe { key: "a".to_owned() },
        Request::Disconnect,
    ]);
    Connection::handshake(store.clone(), session("1"), sessions.admit()?, channel)?.serve();

    assert_eq!(store.subscribers("a")?, Some(vec!["/tmp/notif2".to_owned()]));
    Ok(())
}

#[test]
fn a_release_wakes_exactly_one_waiter() -> Result<()> {
    let sessions = SessionManager::new(2)?;
    let first = sessions.admit()?;
    let second = sessions.admit()?;
    let (admitted_tx, admitted_rx) = channel::unbounded();

    scope(|s| {
        for _ in 0..2 {
            let admitted_tx = admitted_tx.clone();
            let sessions = &sessions;
            // the admitted slot is handed back so it stays held
            s.spawn(move |_| admitted_tx.send(sessions.admit()).unwrap());
        }
        let short = Duration::from_millis(200);
        assert_eq!(admitted_rx.recv_timeout(short).unwrap_err(), RecvTimeoutError::Timeout);

        drop(first);
        let woken = admitted_rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(admitted_rx.recv_timeout(short).unwrap_err(), RecvTimeoutError::Timeout);
        assert!(sessions.try_admit().unwrap().is_none());

        drop(second);
        let last = admitted_rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_ne!(woken.id(), last.id());
    })
    .unwrap();
    Ok(())
}

#[test]
fn failed_handshake_releases_the_slot() -> Result<()> {
    let sessions = SessionManager::new(1)?;
    let (channel, responses) = ScriptedChannel::failing_on(vec![], OpCode::Connect);

    let connection = Connection::handshake(KvStore::new(), session("1"), sessions.admit()?, channel);
    assert!(matches!(connection, Err(KvsError::Io(_))));
    assert!(responses.lock().unwrap().is_empty());

    assert_eq!(sessions.states()?, vec![SlotState::Free]);
    // the same identity can connect again
    let (channel, _) = ScriptedChannel::new(vec![]);
    let _retry = Connection::handshake(KvStore::new(), session("1"), sessions.admit()?, channel)?;
    assert_eq!(sessions.active_sessions()?, 1);
    Ok(())
}

#[test]
fn disconnect_frees_the_slot_when_the_ack_is_lost() -> Result<()> {
    let store = KvStore::new();
    store.write("a".to_owned(), "1".to_owned())?;
    let sessions = SessionManager::new(1)?;

    let (channel, responses) = ScriptedChannel::failing_on(
        vec![Request::Subscribe { key: "a".to_owned() }, Request::Disconnect],
        OpCode::Disconnect,
    );
    Connection::handshake(store.clone(), session("1"), sessions.admit()?, channel)?.serve();

    assert_eq!(
        *responses.lock().unwrap(),
        vec![ok(OpCode::Connect), ok(OpCode::Subscribe)]
    );
    assert_eq!(store.subscribers("a")?, Some(vec![]));
    assert_eq!(sessions.states()?, vec![SlotState::Free]);
    Ok(())
}

//! Line-delimited JSON replication protocol used by the in-memory structures.
//!
//! Each side sends `hello` first, then `records` for every structure attached
//! to the session. Records for a key nobody attached yet are buffered until a
//! structure with that key joins.

use replication_client::{Handshake, ReplicationSession, ReplicationStream, SessionDriver, StructureKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

/// Buffer size of the in-memory byte stream behind each session.
pub const SESSION_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Hello { key: String, user_data: String },
    Records { key: String, records: Vec<Vec<u8>> },
}

/// Write one message as a JSON line.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, msg: &WireMessage) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(msg)?;
    line.push(b'\n');
    writer.write_all(&line).await
}

/// A structure's content as seen by the protocol.
pub trait RecordStore: Send + Sync {
    fn store_key(&self) -> StructureKey;
    fn snapshot(&self) -> Vec<Vec<u8>>;
    fn apply(&self, records: Vec<Vec<u8>>);
}

#[derive(Default)]
struct MuxState {
    stores: HashMap<StructureKey, Arc<dyn RecordStore>>,
    pending: HashMap<StructureKey, Vec<Vec<u8>>>,
}

/// Per-session protocol state, installed on the session so a second
/// structure can join it.
pub struct Mux {
    outbound: mpsc::UnboundedSender<WireMessage>,
    state: Mutex<MuxState>,
}

impl Mux {
    /// Attach a structure: deliver buffered records and announce its content.
    pub fn attach(&self, store: Arc<dyn RecordStore>) {
        let key = store.store_key();
        let pending = {
            let mut state = self.state.lock().unwrap();
            state.stores.insert(key, store.clone());
            state.pending.remove(&key)
        };
        if let Some(records) = pending {
            store.apply(records);
        }
        let _ = self.outbound.send(WireMessage::Records {
            key: key.to_hex(),
            records: store.snapshot(),
        });
    }

    fn deliver(&self, key: StructureKey, records: Vec<Vec<u8>>) {
        let store = {
            let mut state = self.state.lock().unwrap();
            match state.stores.get(&key) {
                Some(store) => Some(store.clone()),
                None => {
                    state.pending.entry(key).or_default().extend(records.iter().cloned());
                    None
                }
            }
        };
        if let Some(store) = store {
            store.apply(records);
        }
    }

    pub fn attached(&self) -> usize {
        self.state.lock().unwrap().stores.len()
    }
}

/// Start a session driven by `store`. `user_data` goes into our hello.
pub fn open_session(store: Arc<dyn RecordStore>, user_data: Vec<u8>) -> ReplicationStream {
    let (client_io, protocol_io) = tokio::io::duplex(SESSION_BUFFER);
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let mux = Arc::new(Mux {
        outbound,
        state: Mutex::new(MuxState::default()),
    });

    let (session, driver) = ReplicationSession::new(mux.clone());
    let _ = mux.outbound.send(WireMessage::Hello {
        key: store.store_key().to_hex(),
        user_data: hex::encode(user_data),
    });
    mux.attach(store);

    tokio::spawn(run_protocol(protocol_io, outbound_rx, mux, driver));
    ReplicationStream::new(session, client_io)
}

async fn run_protocol(
    io: DuplexStream,
    mut outbound: mpsc::UnboundedReceiver<WireMessage>,
    mux: Arc<Mux>,
    driver: SessionDriver,
) {
    let (reader, mut writer) = tokio::io::split(io);
    let mut lines = BufReader::new(reader).lines();
    let mut finalized = false;

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                if write_message(&mut writer, &msg).await.is_err() {
                    break;
                }
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match serde_json::from_str::<WireMessage>(&line) {
                    Ok(WireMessage::Hello { key, user_data }) => {
                        driver.complete_handshake(Handshake::new(
                            StructureKey::from_hex(&key).ok(),
                            hex::decode(user_data).unwrap_or_default(),
                        ));
                    }
                    Ok(WireMessage::Records { key, records }) => {
                        if let Ok(key) = StructureKey::from_hex(&key) {
                            mux.deliver(key, records);
                        }
                    }
                    Err(_) => break,
                }
            }
            _ = driver.finalized(), if !finalized => {
                finalized = true;
                let _ = writer.shutdown().await;
            }
        }
    }

    driver.close();
}

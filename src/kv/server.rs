// Server-side CRUD dispatcher.
//
// Applies one request to the local table, logs the outcome, and replies
// to the coordinator. The server never consults the ring: placement is
// the coordinator's responsibility.

use crate::common::{Address, TransId};
use crate::kv::message::{KvMessage, KvOp};
use crate::kv::store::KvStore;
use crate::oplog::OpLog;
use crate::transport::Transport;

#[allow(clippy::too_many_arguments)]
pub fn handle_request(
    store: &mut KvStore,
    self_addr: &Address,
    transport: &dyn Transport,
    oplog: &dyn OpLog,
    trans_id: TransId,
    from: Address,
    op: KvOp,
    key: &str,
    value: Option<&str>,
) {
    let reply = match op {
        KvOp::Create => {
            let value = value.unwrap_or("");
            let success = store.create(key, value);
            if success {
                oplog.create_success(self_addr, false, trans_id, key, value);
            } else {
                oplog.create_fail(self_addr, false, trans_id, key, value);
            }
            KvMessage::Reply {
                trans_id,
                from: *self_addr,
                success,
            }
        }
        KvOp::Read => {
            // Absent keys read as the empty string, which the coordinator
            // treats as a miss.
            let value = store.read(key).unwrap_or("").to_string();
            if value.is_empty() {
                oplog.read_fail(self_addr, false, trans_id, key);
            } else {
                oplog.read_success(self_addr, false, trans_id, key, &value);
            }
            KvMessage::ReadReply {
                trans_id,
                from: *self_addr,
                value,
            }
        }
        KvOp::Update => {
            let value = value.unwrap_or("");
            let success = store.update(key, value);
            if success {
                oplog.update_success(self_addr, false, trans_id, key, value);
            } else {
                oplog.update_fail(self_addr, false, trans_id, key, value);
            }
            KvMessage::Reply {
                trans_id,
                from: *self_addr,
                success,
            }
        }
        KvOp::Delete => {
            let success = store.delete(key);
            if success {
                oplog.delete_success(self_addr, false, trans_id, key);
            } else {
                oplog.delete_fail(self_addr, false, trans_id, key);
            }
            KvMessage::Reply {
                trans_id,
                from: *self_addr,
                success,
            }
        }
    };
    transport.send(self_addr, &from, &reply.encode());
}

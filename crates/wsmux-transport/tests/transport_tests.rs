//! Component tests for the transport building blocks: buffer pool,
//! batcher, link registry, supervisor and connection phases.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

// ─────────────────────────────────────────────────────────────────────────────
// Buffer pool
// ─────────────────────────────────────────────────────────────────────────────

mod bufferpool {
    use wsmux_transport::BufferPool;
    use wsmux_transport::bufferpool::{LARGE_TIER, MEDIUM_TIER, SMALL_TIER};

    #[test]
    fn acquire_release_acquire_at_tier_boundaries() {
        let pool = BufferPool::new();
        for n in [0, 1, 4096, 4097, 32768, 32769, 262144, 262145] {
            let buf = pool.acquire(n);
            assert_eq!(buf.len(), 0, "hint {n}");
            assert!(buf.capacity() >= n, "hint {n}: capacity {}", buf.capacity());
            pool.release(buf);

            let buf = pool.acquire(n);
            assert_eq!(buf.len(), 0, "hint {n} after release");
            assert!(buf.capacity() >= n, "hint {n} after release: capacity {}", buf.capacity());
            pool.release(buf);
        }
    }

    #[test]
    fn released_buffers_are_reused_from_matching_tier() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire(100);
        buf.extend_from_slice(b"leftover");
        pool.release(buf);
        assert_eq!(pool.idle_counts(), [1, 0, 0]);

        let buf = pool.acquire(SMALL_TIER);
        assert!(buf.is_empty());
        assert_eq!(pool.idle_counts(), [0, 0, 0]);
        pool.release(buf);

        pool.release(Vec::with_capacity(MEDIUM_TIER));
        pool.release(Vec::with_capacity(LARGE_TIER));
        assert_eq!(pool.idle_counts(), [1, 1, 1]);
    }

    #[test]
    fn undersized_and_oversized_buffers_are_not_pooled() {
        let pool = BufferPool::new();
        pool.release(Vec::with_capacity(16));
        pool.release(Vec::with_capacity(LARGE_TIER * 2));
        assert_eq!(pool.idle_counts(), [0, 0, 0]);
    }

    #[test]
    fn small_buffer_never_serves_a_larger_tier() {
        let pool = BufferPool::new();
        pool.release(Vec::with_capacity(SMALL_TIER));
        let buf = pool.acquire(SMALL_TIER + 1);
        assert!(buf.capacity() >= SMALL_TIER + 1);
        assert_eq!(pool.idle_counts(), [1, 0, 0]);
    }

    #[test]
    fn acquire_len_returns_requested_length() {
        let pool = BufferPool::new();
        let buf = pool.acquire_len(512);
        assert_eq!(buf.len(), 512);
        assert!(buf.capacity() >= 512);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Batcher
// ─────────────────────────────────────────────────────────────────────────────

mod batcher {
    use super::*;
    use tokio::time::Instant;
    use wsmux_protocol::decode_batch;
    use wsmux_transport::{BatchState, Batcher, BufferPool, Flushed};

    #[test]
    fn first_push_arms_deadline_once() {
        let mut batcher = Batcher::new(Duration::from_millis(16));
        assert_eq!(batcher.state(), BatchState::Idle);
        assert_eq!(batcher.deadline(), None);

        let start = Instant::now();
        batcher.push(Bytes::from_static(b"{\"a\":1}"), start);
        assert_eq!(batcher.deadline(), Some(start + Duration::from_millis(16)));

        batcher.push(Bytes::from_static(b"{\"a\":2}"), start + Duration::from_millis(10));
        assert_eq!(batcher.deadline(), Some(start + Duration::from_millis(16)));
        assert_eq!(batcher.len(), 2);
    }

    #[test]
    fn singleton_flushes_as_plain_message() {
        let pool = BufferPool::new();
        let mut batcher = Batcher::new(Duration::from_millis(16));
        let msg = Bytes::from_static(b"{\"eventtype\":\"rpc\",\"data\":{}}");
        batcher.push(msg.clone(), Instant::now());

        assert_eq!(batcher.take(&pool), Some(Flushed::Single(msg)));
        assert_eq!(batcher.state(), BatchState::Idle);
        assert!(batcher.is_empty());
    }

    #[test]
    fn multiple_messages_flush_as_ordered_envelope() {
        let pool = BufferPool::new();
        let mut batcher = Batcher::new(Duration::from_millis(16));
        let msgs: Vec<Bytes> = (0..3)
            .map(|i| Bytes::from(format!("{{\"seq\":{i}}}")))
            .collect();
        let now = Instant::now();
        for msg in &msgs {
            batcher.push(msg.clone(), now);
        }

        let Some(Flushed::Batch(frame)) = batcher.take(&pool) else {
            panic!("expected a batch frame");
        };
        assert_eq!(decode_batch(&frame).unwrap(), msgs);
        assert_eq!(batcher.deadline(), None);
    }

    #[test]
    fn empty_take_is_noop() {
        let pool = BufferPool::new();
        let mut batcher = Batcher::new(Duration::from_millis(16));
        assert_eq!(batcher.take(&pool), None);
        assert_eq!(batcher.state(), BatchState::Idle);
    }

    #[test]
    fn written_batch_buffer_goes_back_to_pool() {
        let pool = BufferPool::new();
        let mut batcher = Batcher::new(Duration::from_millis(16));
        batcher.push(Bytes::from_static(b"1"), Instant::now());
        batcher.push(Bytes::from_static(b"2"), Instant::now());
        let Some(Flushed::Batch(frame)) = batcher.take(&pool) else {
            panic!("expected a batch frame");
        };
        // the frame owns the buffer until it is written
        assert_eq!(pool.idle_counts(), [0, 0, 0]);
        assert!(pool.reclaim(frame));
        assert_eq!(pool.idle_counts(), [1, 0, 0]);

        batcher.push(Bytes::from_static(b"3"), Instant::now());
        batcher.push(Bytes::from_static(b"4"), Instant::now());
        let Some(Flushed::Batch(frame)) = batcher.take(&pool) else {
            panic!("expected a batch frame");
        };
        assert_eq!(pool.idle_counts(), [0, 0, 0]);
        let _in_flight = frame.clone();
        assert!(!pool.reclaim(frame));
        assert_eq!(pool.idle_counts(), [0, 0, 0]);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Link registry
// ─────────────────────────────────────────────────────────────────────────────

mod registry {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};
    use wsmux_protocol::LinkId;
    use wsmux_transport::{LinkRegistry, LinkRouter, RpcProxy, StableConnInfo};

    #[derive(Default)]
    struct RecordingRouter {
        next: AtomicI32,
        live: Mutex<Vec<(LinkId, RpcProxy)>>,
        unregistered: Mutex<Vec<LinkId>>,
    }

    impl LinkRouter for RecordingRouter {
        fn register_trusted_router(&self, proxy: RpcProxy) -> LinkId {
            let id = LinkId(self.next.fetch_add(1, Ordering::Relaxed) + 1);
            self.live.lock().push((id, proxy));
            id
        }

        fn unregister_link(&self, link_id: LinkId) {
            self.live.lock().retain(|(id, _)| *id != link_id);
            self.unregistered.lock().push(link_id);
        }
    }

    fn setup() -> (Arc<RecordingRouter>, LinkRegistry) {
        let router = Arc::new(RecordingRouter::default());
        let registry = LinkRegistry::new(router.clone());
        (router, registry)
    }

    fn proxy(name: &str) -> RpcProxy {
        RpcProxy::pair(name, 4).0
    }

    #[test]
    fn register_installs_mapping() {
        let (router, registry) = setup();
        let link = registry.register("conn-1", "abc", proxy("ws:abc"));
        assert!(link.is_some());
        assert_eq!(
            registry.lookup("abc"),
            Some(StableConnInfo { conn_id: "conn-1".into(), link_id: link })
        );
        assert_eq!(router.live.lock().len(), 1);
        assert_eq!(router.live.lock()[0].1.name, "ws:abc");
    }

    #[test]
    fn reregister_same_stable_id_replaces_and_unregisters_prior_link() {
        let (router, registry) = setup();
        let first = registry.register("conn-1", "abc", proxy("ws:abc"));
        let second = registry.register("conn-2", "abc", proxy("ws:abc"));

        assert_ne!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("abc").unwrap().conn_id, "conn-2");
        assert_eq!(*router.unregistered.lock(), vec![first]);
        assert_eq!(router.live.lock().len(), 1);
    }

    #[test]
    fn unregister_with_stale_conn_id_is_noop() {
        let (router, registry) = setup();
        registry.register("conn-1", "abc", proxy("ws:abc"));
        let second = registry.register("conn-2", "abc", proxy("ws:abc"));

        assert!(!registry.unregister("conn-1", "abc"));
        assert_eq!(
            registry.lookup("abc"),
            Some(StableConnInfo { conn_id: "conn-2".into(), link_id: second })
        );
        assert_eq!(router.unregistered.lock().len(), 1);
    }

    #[test]
    fn unregister_with_matching_conn_id_removes_and_unregisters() {
        let (router, registry) = setup();
        let link = registry.register("conn-1", "abc", proxy("ws:abc"));
        assert!(registry.unregister("conn-1", "abc"));
        assert!(registry.is_empty());
        assert_eq!(*router.unregistered.lock(), vec![link]);
    }

    #[test]
    fn unregister_unknown_stable_id_is_noop() {
        let (router, registry) = setup();
        assert!(!registry.unregister("conn-1", "missing"));
        assert!(router.unregistered.lock().is_empty());
    }

    #[test]
    fn distinct_stable_ids_coexist() {
        let (_router, registry) = setup();
        registry.register("conn-1", "abc", proxy("ws:abc"));
        registry.register("conn-2", "def", proxy("ws:def"));
        assert_eq!(registry.len(), 2);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Supervisor
// ─────────────────────────────────────────────────────────────────────────────

mod supervisor {
    use wsmux_protocol::CommandError;
    use wsmux_transport::TransportError;
    use wsmux_transport::supervisor::{TaskExit, catch_panic, contain, supervise};

    #[tokio::test]
    async fn panicking_task_is_contained() {
        let exit = supervise("test-task", async {
            if true {
                panic!("boom");
            }
            Ok(())
        })
        .await;
        assert!(matches!(exit, TaskExit::Panicked(ref msg) if msg == "boom"));
    }

    #[tokio::test]
    async fn failing_task_reports_error() {
        let exit = supervise("test-task", async {
            Err(TransportError::Read("reset".into()))
        })
        .await;
        assert!(matches!(exit, TaskExit::Failed(TransportError::Read(_))));
    }

    #[tokio::test]
    async fn completed_task() {
        let exit = supervise("test-task", async { Ok(()) }).await;
        assert!(matches!(exit, TaskExit::Completed));
    }

    #[tokio::test]
    async fn catch_panic_formats_owned_messages() {
        let result = catch_panic(async {
            let n = 3;
            if n > 2 {
                panic!("value was {n}");
            }
        })
        .await;
        assert_eq!(result, Err("value was 3".to_string()));
    }

    #[test]
    fn contained_command_panic_becomes_command_error() {
        let result: Result<(), CommandError> = contain("wscommand:rpc", || panic!("bad input"));
        match result {
            Err(CommandError::Panic { context, message }) => {
                assert_eq!(context, "wscommand:rpc");
                assert_eq!(message, "bad input");
            }
            other => panic!("expected contained panic, got {other:?}"),
        }
    }

    #[test]
    fn contain_passes_through_results() {
        assert_eq!(contain("ctx", || Ok(5)).unwrap(), 5);
        let result: Result<(), CommandError> = contain("ctx", || Err(CommandError::MissingDiscriminator));
        let err = result.unwrap_err();
        assert!(matches!(err, CommandError::MissingDiscriminator));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection phases
// ─────────────────────────────────────────────────────────────────────────────

mod client {
    use wsmux_transport::{ClientConnection, ConnPhase};

    #[test]
    fn new_connection_is_upgraded_with_fresh_id() {
        let a = ClientConnection::new("abc".into());
        let b = ClientConnection::new("abc".into());
        assert_eq!(a.phase(), ConnPhase::Upgraded);
        assert_ne!(a.conn_id, b.conn_id);
    }

    #[test]
    fn phases_only_move_forward() {
        let mut conn = ClientConnection::new("abc".into());
        conn.advance(ConnPhase::Serving);
        conn.advance(ConnPhase::Registered);
        assert_eq!(conn.phase(), ConnPhase::Serving);
        conn.advance(ConnPhase::Closed);
        assert_eq!(conn.phase(), ConnPhase::Closed);
    }
}

//! Integration tests for ate-runtime.
//!
//! These tests cover:
//! - Default objects and scripts replayed by the manager
//! - Serialized calls on one runtime
//! - Event delivery, resubscription and shutdown cleanup
//! - Capability sentinels as seen from scripts
//! - The network bootstrap envelope

use ate_runtime::network::{self, ErrorCode, Request};
use ate_runtime::{
    subscription_id, ApiValue, CapabilitySurface, CapturingLogger, Event, EventHub,
    ManagerConfig, RuntimeError, RuntimeManager,
};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (Arc<EventHub>, RuntimeManager) {
    init_tracing();
    let hub = Arc::new(EventHub::new());
    let manager = RuntimeManager::new(hub.clone());
    (hub, manager)
}

// ==============================================================================
// Registry
// ==============================================================================

#[test]
fn test_new_runtime_has_registered_defaults() {
    let (_hub, manager) = setup();
    manager.register_api_object(
        "host",
        ApiValue::object().with_member(
            "double",
            ApiValue::function(|args| {
                let n = args.first().and_then(|v| v.as_i64()).ok_or("expected a number")?;
                Ok(json!(n * 2))
            }),
        ),
    );
    manager.register_api_script("function defaultOnly() return host:double(21) end");

    manager.create_runtime("a").unwrap();
    let rt = manager.get_runtime("a").unwrap();
    assert_eq!(rt.call_func("defaultOnly", &[]).unwrap(), json!(42));
}

#[test]
fn test_remove_unknown_runtime_is_a_no_op() {
    let (_hub, manager) = setup();
    manager.create_runtime("kept").unwrap();

    manager.remove_runtime("never-created");
    assert_eq!(manager.runtime_names(), vec!["kept".to_string()]);
}

#[test]
fn test_manager_from_config_loads_default_scripts() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("util.lua"),
        "function greet(who) return 'hello ' .. who end",
    )
    .unwrap();
    let config_path = dir.path().join("ate.toml");
    std::fs::write(
        &config_path,
        "[runtime]\ndefault_scripts = [\"util.lua\"]\n\n[capabilities]\nmax_exp_bits = 64\n",
    )
    .unwrap();

    let config = ManagerConfig::load(&config_path).unwrap();
    let manager = RuntimeManager::from_config(&config, Arc::new(EventHub::new())).unwrap();
    let rt = manager.create_runtime("cfg").unwrap();

    assert_eq!(rt.call_func("greet", &[json!("ate")]).unwrap(), json!("hello ate"));
    rt.add_script(
        "function tooBig() local v, kind = Exp('2', '100'); return kind end",
    )
    .unwrap();
    assert_eq!(rt.call_func("tooBig", &[]).unwrap(), json!("exponent_too_large"));
}

#[test]
fn test_manager_from_config_rejects_missing_script() {
    let mut config = ManagerConfig::default();
    config.runtime.default_scripts.push("/nonexistent/ate/util.lua".into());

    let result = RuntimeManager::from_config(&config, Arc::new(EventHub::new()));
    assert!(matches!(result, Err(RuntimeError::Io(_))));
}

// ==============================================================================
// Execution context
// ==============================================================================

#[test]
fn test_concurrent_calls_do_not_interleave() {
    let (_hub, manager) = setup();
    let rt = manager.create_runtime("serial").unwrap();
    rt.add_script(
        r#"
        log = {}
        function slow(tag)
            table.insert(log, tag .. ":start")
            local x = 0
            for i = 1, 2000000 do x = x + i end
            table.insert(log, tag .. ":end")
        end
        function readLog() return log end
        "#,
    )
    .unwrap();

    let handles: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|tag| {
            let rt = Arc::clone(&rt);
            thread::spawn(move || rt.call_func("slow", &[json!(tag)]).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let log: Vec<String> = serde_json::from_value(rt.call_func("readLog", &[]).unwrap()).unwrap();
    assert_eq!(log.len(), 4);
    for pair in log.chunks(2) {
        let tag = pair[0].trim_end_matches(":start");
        assert_eq!(pair[1], format!("{tag}:end"), "log = {log:?}");
    }
}

#[test]
fn test_load_script_files_stops_at_first_failure() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.lua");
    let broken = dir.path().join("broken.lua");
    let never = dir.path().join("never.lua");
    std::fs::write(&first, "firstLoaded = true").unwrap();
    std::fs::write(&broken, "this is not lua").unwrap();
    std::fs::write(&never, "neverLoaded = true").unwrap();

    let (_hub, manager) = setup();
    let rt = manager.create_runtime("files").unwrap();
    let result = rt.load_script_files([&first, &broken, &never]);

    assert!(matches!(result, Err(RuntimeError::Execution { .. })));
    assert!(rt.has_global("firstLoaded").unwrap());
    assert!(!rt.has_global("neverLoaded").unwrap());
}

#[test]
fn test_script_errors_leave_runtime_usable() {
    let (_hub, manager) = setup();
    let rt = manager.create_runtime("resilient").unwrap();

    assert!(rt.add_script("error('first')").is_err());
    assert!(matches!(
        rt.call_func("missing", &[]),
        Err(RuntimeError::Resolution(_))
    ));
    rt.add_script("function ok() return true end").unwrap();
    assert_eq!(rt.call_func("ok", &[]).unwrap(), json!(true));
}

#[test]
fn test_primitives_are_read_only() {
    let (_hub, manager) = setup();
    let rt = manager.create_runtime("guarded").unwrap();

    assert!(rt.add_script("Add = nil").is_err());
    assert!(rt
        .add_script("getmetatable(_G).__index.RuntimeId = 'b'")
        .is_err());
    assert!(rt
        .add_script("rawset(_G, 'Add', function() return 'evil' end)")
        .is_err());
    assert!(rt.add_script("setmetatable(_G, {})").is_err());
    rt.add_script("function sum() return Add('1', '2') end").unwrap();
    assert_eq!(rt.call_func("sum", &[]).unwrap(), json!("0x03"));
    assert!(matches!(
        rt.bind_script_object("RuntimeId", json!("other").into()),
        Err(RuntimeError::ReadOnlyBinding(_))
    ));
    rt.add_script("function who() return RuntimeId end").unwrap();
    assert_eq!(rt.call_func("who", &[]).unwrap(), json!("guarded"));
}

// ==============================================================================
// Capabilities from scripts
// ==============================================================================

#[test]
fn test_script_sees_sentinels_and_error_kinds() {
    let (_hub, manager) = setup();
    let rt = manager.create_runtime("caps").unwrap();
    rt.add_script(
        r#"
        function sum() return Add("0x01", "2") end
        function divByZero()
            local v, kind = Div("0x10", "0")
            return { nan = v ~= v, kind = kind }
        end
        function badInput()
            local v, kind = Mul("zz", "1")
            return { isNil = v == nil, kind = kind }
        end
        function hash() return SHA3("0x") end
        "#,
    )
    .unwrap();

    assert_eq!(rt.call_func("sum", &[]).unwrap(), json!("0x03"));
    assert_eq!(
        rt.call_func("divByZero", &[]).unwrap(),
        json!({"nan": true, "kind": "division_by_zero"})
    );
    assert_eq!(
        rt.call_func("badInput", &[]).unwrap(),
        json!({"isNil": true, "kind": "parse_failure"})
    );
    assert_eq!(
        rt.call_func("hash", &[]).unwrap(),
        json!("0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
    );
}

#[test]
fn test_script_logging_reaches_injected_logger() {
    let logger = Arc::new(CapturingLogger::new());
    let manager = RuntimeManager::new(Arc::new(EventHub::new()))
        .with_surface(CapabilitySurface::new(logger.clone()));
    let rt = manager.create_runtime("chatty").unwrap();
    logger.clear();

    rt.add_script(r#"Printf("%s=%d", "x", 5); Println("a", 1)"#).unwrap();

    assert_eq!(
        logger.entries(),
        vec![
            ("chatty".to_string(), "x=5".to_string()),
            ("chatty".to_string(), "a 1".to_string()),
        ]
    );
}

// ==============================================================================
// Event bridge
// ==============================================================================

const SUBSCRIBER_SCRIPT: &str = r#"
hits = {}
events:subscribe("chain", "block", "", function(e) table.insert(hits, "first") end)
events:subscribe("chain", "block", "", function(e) table.insert(hits, "second:" .. e.Resource.label) end)
function readHits() return hits end
"#;

#[test]
fn test_resubscribe_replaces_callback() {
    let (hub, manager) = setup();
    let rt = manager.create_runtime("watcher").unwrap();
    rt.add_script(SUBSCRIBER_SCRIPT).unwrap();

    let id = subscription_id("watcher", "chain", "block");
    assert_eq!(hub.subscription_ids(), vec![id.clone()]);
    assert_eq!(rt.subscription_ids(), vec![id]);

    let delivered = hub.post(&Event::new("chain", "block", json!({"label": "tip"})));
    assert_eq!(delivered, 1);
    assert_eq!(rt.call_func("readHits", &[]).unwrap(), json!(["second:tip"]));
}

#[test]
fn test_recreated_runtime_keeps_its_subscriptions() {
    let (hub, manager) = setup();
    manager.register_api_script(SUBSCRIBER_SCRIPT);

    let old = manager.create_runtime("a").unwrap();
    let new = manager.create_runtime("a").unwrap();

    assert!(old.is_shut_down());
    assert_eq!(hub.subscription_ids(), vec![subscription_id("a", "chain", "block")]);
    assert_eq!(new.subscription_ids(), hub.subscription_ids());

    let delivered = hub.post(&Event::new("chain", "block", json!({"label": "fresh"})));
    assert_eq!(delivered, 1);
    assert_eq!(new.call_func("readHits", &[]).unwrap(), json!(["second:fresh"]));
}

#[test]
fn test_runtime_cannot_claim_another_runtimes_subscription() {
    let (hub, manager) = setup();
    let a = manager.create_runtime("a").unwrap();
    let b = manager.create_runtime("b").unwrap();
    a.add_script(
        r#"
        hits = 0
        events:subscribe("s", "e", "", function(e) hits = hits + 1 end)
        function readHits() return hits end
        "#,
    )
    .unwrap();

    let hijack = b.add_script("events_subscribe('s', 'e', '', 'a_s_e')");
    assert!(matches!(hijack, Err(RuntimeError::Execution { .. })));
    assert!(b.subscription_ids().is_empty());

    assert_eq!(hub.post(&Event::new("s", "e", json!(null))), 1);
    assert_eq!(a.call_func("readHits", &[]).unwrap(), json!(1));
}

#[test]
fn test_unmatched_and_failing_events_do_not_break_runtime() {
    let (hub, manager) = setup();
    let rt = manager.create_runtime("fragile").unwrap();
    rt.add_script(
        r#"
        events:subscribe("chain", "reorg", "", function(e) error("callback blew up") end)
        function alive() return true end
        "#,
    )
    .unwrap();

    assert_eq!(hub.post(&Event::new("chain", "block", json!(null))), 0);
    assert_eq!(hub.post(&Event::new("chain", "reorg", json!(null))), 1);
    assert_eq!(rt.call_func("alive", &[]).unwrap(), json!(true));
}

#[test]
fn test_target_filters_delivery() {
    let (hub, manager) = setup();
    let rt = manager.create_runtime("targeted").unwrap();
    rt.add_script(
        r#"
        seen = 0
        events:subscribe("chain", "block", "me", function(e) seen = seen + 1 end)
        function readSeen() return seen end
        "#,
    )
    .unwrap();

    hub.post(&Event::new("chain", "block", json!(null)).with_target("someone-else"));
    hub.post(&Event::new("chain", "block", json!(null)).with_target("me"));
    assert_eq!(rt.call_func("readSeen", &[]).unwrap(), json!(1));
}

#[test]
fn test_unsubscribe_and_shutdown_withdraw_subscriptions() {
    let (hub, manager) = setup();
    let rt = manager.create_runtime("leaver").unwrap();
    rt.add_script(
        r#"
        events:subscribe("chain", "block", "", function(e) end)
        events:subscribe("chain", "tx", "", function(e) end)
        events:unsubscribe("chain", "tx")
        "#,
    )
    .unwrap();
    assert_eq!(hub.subscriber_count(), 1);

    manager.remove_runtime("leaver");
    assert_eq!(hub.subscriber_count(), 0);
    assert!(matches!(
        rt.call_func("anything", &[]),
        Err(RuntimeError::Shutdown(_))
    ));
}

#[tokio::test]
async fn test_dispatcher_delivers_into_runtime() {
    let (hub, manager) = setup();
    let rt = manager.create_runtime("async").unwrap();
    rt.add_script(SUBSCRIBER_SCRIPT).unwrap();

    let (tx, handle) = EventHub::spawn_dispatcher(hub.clone());
    tx.send(Event::new("chain", "block", json!({"label": "one"})))
        .unwrap();
    tx.send(Event::new("chain", "block", json!({"label": "two"})))
        .unwrap();
    drop(tx);
    handle.await.unwrap();

    assert_eq!(
        rt.call_func("readHits", &[]).unwrap(),
        json!(["second:one", "second:two"])
    );
}

// ==============================================================================
// Network bootstrap
// ==============================================================================

#[test]
fn test_ws_session_round_trip() {
    let (_hub, manager) = setup();
    let rt = manager.create_runtime("server").unwrap();
    rt.add_script(
        r#"
        function network:newWsCallback(sessionId)
            return function(request)
                local response = network:getWsResponse()
                response.Method = request.Method
                response.Id = request.Id
                response.Result = "pong:" .. sessionId
                return response
            end
        end
        "#,
    )
    .unwrap();

    network::open_ws_session(&rt, "s1").unwrap();
    let request = serde_json::to_string(&Request::new("ping", json!([])).with_id("7")).unwrap();
    let response = network::incoming_ws_message(&rt, "s1", &request)
        .unwrap()
        .unwrap();

    assert_eq!(response.protocol, network::PROTOCOL);
    assert_eq!(response.method, "ping");
    assert_eq!(response.id, json!("7"));
    assert_eq!(response.result, json!("pong:s1"));
    assert!(response.time.is_number());
    assert!(response.error.is_none());

    network::close_ws_session(&rt, "s1").unwrap();
    let after = network::incoming_ws_message(&rt, "s1", &request)
        .unwrap()
        .unwrap();
    assert_eq!(after.error_code(), Some(ErrorCode::Server));
}

#[test]
fn test_ws_error_envelopes() {
    let (_hub, manager) = setup();
    let rt = manager.create_runtime("strict").unwrap();
    rt.add_script(
        r#"
        function network:newWsCallback(sessionId)
            return function(request)
                if request.Method == "quiet" then return nil end
                error("handler failed")
            end
        end
        "#,
    )
    .unwrap();
    network::open_ws_session(&rt, "s").unwrap();

    let parse = network::incoming_ws_message(&rt, "s", "{not json").unwrap().unwrap();
    assert_eq!(parse.error_code(), Some(ErrorCode::Parse));

    let no_method = network::incoming_ws_message(&rt, "s", r#"{"Protocol":"EWSMP1"}"#)
        .unwrap()
        .unwrap();
    assert_eq!(no_method.error_code(), Some(ErrorCode::MethodNotFound));

    let failed = network::incoming_ws_message(&rt, "s", r#"{"Method":"boom"}"#)
        .unwrap()
        .unwrap();
    assert_eq!(failed.error_code(), Some(ErrorCode::Internal));
    assert!(failed.error.unwrap().message.contains("handler failed"));

    let quiet = network::incoming_ws_message(&rt, "s", r#"{"Method":"quiet"}"#).unwrap();
    assert!(quiet.is_none());
}

#[test]
fn test_incoming_http_reaches_registered_callback() {
    let (_hub, manager) = setup();
    let rt = manager.create_runtime("web").unwrap();
    rt.add_script(
        r#"
        network:registerIncomingHttpCallback(function(request)
            return { status = 200, echo = request.Path }
        end)
        "#,
    )
    .unwrap();

    let request = network::HttpRequest {
        method: "GET".to_string(),
        path: "/status".to_string(),
        ..Default::default()
    };
    let reply = network::incoming_http(&rt, &request).unwrap();
    assert_eq!(reply, json!({"status": 200, "echo": "/status"}));
}

//! Paper broker driven through the `Broker` trait, as the rebalancer uses it.

use std::io::Write;

use lotplan::{Code, OrderPlan, Side};
use lotplan_broker::paper::PaperBroker;
use lotplan_broker::{Broker, BrokerError, BrokerOrder, OrderType};

fn snapshot_file(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

const ACCOUNT: &str = r#"{
    "balance": { "cash": 500000, "settlement_cash": 450000, "orderable_cash": 480000 },
    "holdings": [
        { "code": "379810", "qty": 40, "avg_price": 15000 },
        { "code": "458730", "qty": 12, "avg_price": 9800 }
    ],
    "prices": { "379810": 16000, "458730": 10100, "133690": 120000 }
}"#;

// ============================================================================
// Loading
// ============================================================================

#[test]
fn load_from_file() {
    let file = snapshot_file(ACCOUNT);
    let mut broker = PaperBroker::load(file.path()).unwrap();
    broker.connect().unwrap();

    let balance = broker.balance().unwrap();
    assert_eq!(balance.cash, 500_000.0);
    assert_eq!(balance.settlement_cash, Some(450_000.0));
    assert_eq!(balance.orderable_cash, Some(480_000.0));

    let positions = broker.positions().unwrap();
    let codes: Vec<&str> = positions.iter().map(|h| h.code.as_str()).collect();
    assert_eq!(codes, vec!["379810", "458730"]);
}

#[test]
fn missing_file_is_snapshot_error() {
    let result = PaperBroker::load(std::path::Path::new("/nonexistent/paper.json"));
    assert!(matches!(result, Err(BrokerError::Snapshot(_))));
}

#[test]
fn invalid_code_in_snapshot_is_rejected() {
    let json = r#"{ "balance": { "cash": 0 }, "prices": { "THIS-CODE-IS-TOO-LONG": 1 } }"#;
    assert!(PaperBroker::from_json(json).is_err());
}

// ============================================================================
// Trading
// ============================================================================

#[test]
fn plan_orders_fill_in_sequence() {
    let mut broker = PaperBroker::from_json(ACCOUNT).unwrap();
    broker.connect().unwrap();

    let plan = [
        OrderPlan::market(Code::new("379810"), Side::Sell, 10),
        OrderPlan::market(Code::new("133690"), Side::Buy, 2).with_limit(120_100.0),
    ];
    for order in &plan {
        broker.submit_order(&BrokerOrder::from(order)).unwrap();
    }

    let balance = broker.balance().unwrap();
    assert_eq!(balance.cash, 500_000.0 + 160_000.0 - 240_200.0);
    assert_eq!(balance.settlement_cash, Some(450_000.0 + 160_000.0 - 240_200.0));

    let positions = broker.positions().unwrap();
    assert_eq!(positions.len(), 3);
    let recorded = broker.submitted_orders();
    assert_eq!(recorded[1].order_type, OrderType::Limit(120_100.0));
}

#[test]
fn market_order_without_quote_fails() {
    let mut broker = PaperBroker::from_json(ACCOUNT).unwrap();
    broker.connect().unwrap();
    let order = BrokerOrder {
        code: Code::new("000000"),
        side: Side::Buy,
        qty: 1,
        order_type: OrderType::Market,
    };
    assert!(matches!(
        broker.submit_order(&order),
        Err(BrokerError::UnknownInstrument(_))
    ));
}

#[test]
fn disconnect_blocks_queries() {
    let mut broker = PaperBroker::from_json(ACCOUNT).unwrap();
    broker.connect().unwrap();
    broker.disconnect().unwrap();
    assert!(matches!(broker.pending_orders(), Err(BrokerError::NotConnected)));
}

//! In-process mock broker shared by the integration tests.
//!
//! Implements every broker service on a random local port, records what the
//! client sends, and lets tests push events into the open event stream.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::metadata::MetadataMap;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

use trade_api_client::services::{
    GetSecuritiesRequest, GetSecuritiesResult,
    events_server::{Events, EventsServer},
    orders_server::{Orders, OrdersServer},
    portfolios_server::{Portfolios, PortfoliosServer},
    securities_server::{Securities, SecuritiesServer},
    stops_server::{Stops, StopsServer},
};
use trade_api_client::{ClientConfig, StreamSettings, TradeApiClient, proto};

/// Access token every test client presents.
pub const TEST_TOKEN: &str = "test-token";

/// Upper bound on waiting for anything asynchronous.
pub const WAIT: Duration = Duration::from_secs(5);

type EventSender = mpsc::Sender<Result<proto::Event, Status>>;

/// Everything the broker has seen, plus knobs for its replies.
#[derive(Default)]
pub struct BrokerState {
    pub commands: Mutex<Vec<proto::SubscriptionRequest>>,
    pub api_keys: Mutex<Vec<String>>,
    pub new_orders: Mutex<Vec<proto::NewOrderRequest>>,
    pub get_orders: Mutex<Vec<proto::GetOrdersRequest>>,
    pub cancel_orders: Mutex<Vec<proto::CancelOrderRequest>>,
    pub new_stops: Mutex<Vec<proto::NewStopRequest>>,
    pub get_stops: Mutex<Vec<proto::GetStopsRequest>>,
    pub cancel_stops: Mutex<Vec<proto::CancelStopRequest>>,
    pub portfolios: Mutex<Vec<proto::GetPortfolioRequest>>,
    pub securities: Mutex<Vec<proto::Security>>,
    /// Reply to every unary call with this status instead of a result.
    pub unary_failure: Mutex<Option<fn() -> Status>>,
    /// Refuse the event stream with this status.
    pub events_rejection: Mutex<Option<fn() -> Status>>,
    /// Set once the client half-closes its outbound stream.
    pub outbound_closed: AtomicBool,
    /// End the event stream as soon as the client half-closes.
    pub close_on_half_close: AtomicBool,
    event_tx: Mutex<Option<EventSender>>,
}

impl BrokerState {
    fn record_api_key(&self, metadata: &MetadataMap) {
        if let Some(value) = metadata.get("x-api-key") {
            self.api_keys
                .lock()
                .push(value.to_str().unwrap_or_default().to_string());
        }
    }

    fn check_unary(&self, metadata: &MetadataMap) -> Result<(), Status> {
        self.record_api_key(metadata);
        let failure = *self.unary_failure.lock();
        failure.map_or(Ok(()), |make| Err(make()))
    }

    /// Wait until the client has opened the event stream.
    pub async fn wait_for_stream(&self) -> EventSender {
        tokio::time::timeout(WAIT, async {
            loop {
                let tx = self.event_tx.lock().clone();
                if let Some(tx) = tx {
                    return tx;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client never opened the event stream")
    }

    /// Push an event to the client.
    pub async fn send_event(&self, event: proto::Event) {
        let tx = self.wait_for_stream().await;
        tx.send(Ok(event)).await.expect("event stream is open");
    }

    /// Fail the event stream with a status.
    pub async fn fail_stream(&self, status: Status) {
        let tx = self.wait_for_stream().await;
        tx.send(Err(status)).await.expect("event stream is open");
    }

    /// End the event stream cleanly from the server side.
    pub async fn close_stream(&self) {
        self.wait_for_stream().await;
        self.event_tx.lock().take();
    }

    /// Wait until at least `count` commands have arrived.
    pub async fn wait_for_commands(&self, count: usize) -> Vec<proto::SubscriptionRequest> {
        tokio::time::timeout(WAIT, async {
            loop {
                let commands = self.commands.lock().clone();
                if commands.len() >= count {
                    return commands;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("commands did not arrive in time")
    }
}

/// Mock broker implementing every service against one shared state.
#[derive(Clone)]
pub struct MockBroker {
    state: Arc<BrokerState>,
}

#[tonic::async_trait]
impl Events for MockBroker {
    type GetEventsStream = ReceiverStream<Result<proto::Event, Status>>;

    async fn get_events(
        &self,
        request: Request<Streaming<proto::SubscriptionRequest>>,
    ) -> Result<Response<Self::GetEventsStream>, Status> {
        self.state.record_api_key(request.metadata());
        let rejection = *self.state.events_rejection.lock();
        if let Some(make) = rejection {
            return Err(make());
        }

        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(64);
        *self.state.event_tx.lock() = Some(tx);

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Ok(Some(command)) = inbound.message().await {
                state.commands.lock().push(command);
            }
            state.outbound_closed.store(true, Ordering::SeqCst);
            if state.close_on_half_close.load(Ordering::SeqCst) {
                state.event_tx.lock().take();
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

#[tonic::async_trait]
impl Orders for MockBroker {
    async fn get_orders(
        &self,
        request: Request<proto::GetOrdersRequest>,
    ) -> Result<Response<proto::GetOrdersResult>, Status> {
        self.state.check_unary(request.metadata())?;
        let request = request.into_inner();
        let client_id = request.client_id.clone();
        self.state.get_orders.lock().push(request);
        Ok(Response::new(proto::GetOrdersResult {
            client_id,
            orders: vec![proto::Order {
                order_no: 100,
                transaction_id: 7,
                security_code: "SBER".to_string(),
                status: proto::OrderStatus::Active.into(),
                ..Default::default()
            }],
        }))
    }

    async fn new_order(
        &self,
        request: Request<proto::NewOrderRequest>,
    ) -> Result<Response<proto::NewOrderResult>, Status> {
        self.state.check_unary(request.metadata())?;
        let request = request.into_inner();
        let result = proto::NewOrderResult {
            client_id: request.client_id.clone(),
            transaction_id: 42,
            security_code: request.security_code.clone(),
        };
        self.state.new_orders.lock().push(request);
        Ok(Response::new(result))
    }

    async fn cancel_order(
        &self,
        request: Request<proto::CancelOrderRequest>,
    ) -> Result<Response<proto::CancelOrderResult>, Status> {
        self.state.check_unary(request.metadata())?;
        let request = request.into_inner();
        let result = proto::CancelOrderResult {
            client_id: request.client_id.clone(),
            transaction_id: request.transaction_id,
        };
        self.state.cancel_orders.lock().push(request);
        Ok(Response::new(result))
    }
}

#[tonic::async_trait]
impl Stops for MockBroker {
    async fn get_stops(
        &self,
        request: Request<proto::GetStopsRequest>,
    ) -> Result<Response<proto::GetStopsResult>, Status> {
        self.state.check_unary(request.metadata())?;
        let request = request.into_inner();
        let client_id = request.client_id.clone();
        self.state.get_stops.lock().push(request);
        Ok(Response::new(proto::GetStopsResult {
            client_id,
            stops: Vec::new(),
        }))
    }

    async fn new_stop(
        &self,
        request: Request<proto::NewStopRequest>,
    ) -> Result<Response<proto::NewStopResult>, Status> {
        self.state.check_unary(request.metadata())?;
        let request = request.into_inner();
        let result = proto::NewStopResult {
            client_id: request.client_id.clone(),
            stop_id: 9,
            security_code: request.security_code.clone(),
            security_board: request.security_board.clone(),
        };
        self.state.new_stops.lock().push(request);
        Ok(Response::new(result))
    }

    async fn cancel_stop(
        &self,
        request: Request<proto::CancelStopRequest>,
    ) -> Result<Response<proto::CancelStopResult>, Status> {
        self.state.check_unary(request.metadata())?;
        let request = request.into_inner();
        let result = proto::CancelStopResult {
            client_id: request.client_id.clone(),
            stop_id: request.stop_id,
        };
        self.state.cancel_stops.lock().push(request);
        Ok(Response::new(result))
    }
}

#[tonic::async_trait]
impl Portfolios for MockBroker {
    async fn get_portfolio(
        &self,
        request: Request<proto::GetPortfolioRequest>,
    ) -> Result<Response<proto::GetPortfolioResult>, Status> {
        self.state.check_unary(request.metadata())?;
        let request = request.into_inner();
        self.state.portfolios.lock().push(request.clone());
        Ok(Response::new(proto::GetPortfolioResult {
            client_id: request.client_id,
            content: request.content,
            equity: 150_000.0,
            balance: 100_000.0,
            ..Default::default()
        }))
    }
}

#[tonic::async_trait]
impl Securities for MockBroker {
    async fn get_securities(
        &self,
        request: Request<GetSecuritiesRequest>,
    ) -> Result<Response<GetSecuritiesResult>, Status> {
        self.state.check_unary(request.metadata())?;
        Ok(Response::new(GetSecuritiesResult {
            securities: self.state.securities.lock().clone(),
        }))
    }
}

/// Start a mock broker on a random port.
pub async fn start_broker() -> (Arc<BrokerState>, SocketAddr) {
    let state = Arc::new(BrokerState::default());
    let broker = MockBroker {
        state: Arc::clone(&state),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(EventsServer::new(broker.clone()))
            .add_service(OrdersServer::new(broker.clone()))
            .add_service(StopsServer::new(broker.clone()))
            .add_service(PortfoliosServer::new(broker.clone()))
            .add_service(SecuritiesServer::new(broker))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    (state, addr)
}

/// Stream settings with short intervals for tests.
pub fn fast_settings() -> StreamSettings {
    StreamSettings {
        drain_poll_interval: Duration::from_millis(20),
        drain_timeout: Duration::from_secs(2),
        ..StreamSettings::default()
    }
}

/// Connect a client to the broker at `addr`.
pub fn connect(addr: SocketAddr, settings: StreamSettings) -> TradeApiClient {
    let config = ClientConfig::new(TEST_TOKEN)
        .with_endpoint(format!("http://{addr}"))
        .with_stream(settings);
    TradeApiClient::new(config).unwrap()
}

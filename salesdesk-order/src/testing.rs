//! In-memory stand-ins for the three remote seams. Each one records the
//! calls it receives so tests can assert on what went over the wire.

use async_trait::async_trait;
use rust_decimal::Decimal;
use salesdesk_catalog::{
    Customer, DeliveryAddress, Packaging, Policy, PolicyType, PriceQuote, Product,
    ReferencePolicy, Territory, Warehouse,
};
use salesdesk_core::{
    ErpConfirmRequest, ErpOrderAck, ErpOrderRequest, ErpOrderService, GatewayError, GatewayResult,
    LocalOrderRequest, LocalOrderStore, LookupGateway, SalesOrder, WarehouseAssignment,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::watch;

use crate::resolver::SelectionResolver;
use crate::session::ComposeSession;

fn not_found(service: &str, what: impl Into<String>) -> GatewayError {
    GatewayError::Status {
        service: service.to_string(),
        status: 404,
        message: what.into(),
    }
}

/// Holds calls back while closed. Open by default.
#[derive(Debug)]
pub struct Gate {
    open: watch::Sender<bool>,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            open: watch::channel(true).0,
        }
    }
}

impl Gate {
    pub fn close(&self) {
        self.open.send_replace(false);
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    async fn pass(&self) {
        let mut open = self.open.subscribe();
        // the sender lives as long as the gate, so this only ends once open
        let _ = open.wait_for(|open| *open).await;
    }
}

/// Reference data served by [`InMemoryLookup`].
#[derive(Debug, Clone, Default)]
pub struct CatalogData {
    pub territories: Vec<Territory>,
    pub customers: Vec<Customer>,
    pub policies: HashMap<PolicyType, Vec<Policy>>,
    pub reference_policies: Vec<ReferencePolicy>,
    /// Policy id to the reference codes it may draw on.
    pub allowed_codes: HashMap<String, Vec<String>>,
    pub products: Vec<Product>,
    pub packagings: Vec<Packaging>,
    /// Keyed by product id.
    pub quotes: HashMap<String, PriceQuote>,
    pub warehouses: Vec<Warehouse>,
}

impl CatalogData {
    /// A small, consistent catalog used across the test suites.
    ///
    /// - `C-1` has one address; `C-2` has two.
    /// - credit policy `P-1` holds 1000, `P-2` holds 500; every advance policy is spent.
    /// - secure credit `S-1` may draw on `REF-1` (800) and `REF-2` (300); `S-2` on nothing.
    /// - `PR-1` is quoted at 2.50 less 10% per unit, base unit 12.
    pub fn sample() -> Self {
        let money = |units: i64| Decimal::new(units, 0);
        let policy = |id: &str, code: &str, remaining: i64| Policy {
            id: id.to_string(),
            code: code.to_string(),
            remaining_amount: money(remaining),
        };

        let mut policies = HashMap::new();
        policies.insert(
            PolicyType::Credit,
            vec![policy("P-1", "CR-1", 1000), policy("P-2", "CR-2", 500)],
        );
        policies.insert(PolicyType::Advance, vec![policy("A-1", "ADV-1", 0)]);
        policies.insert(
            PolicyType::SecureCredit,
            vec![policy("S-1", "SC-1", 5000), policy("S-2", "SC-2", 5000)],
        );

        let mut allowed_codes = HashMap::new();
        allowed_codes.insert(
            "S-1".to_string(),
            vec!["REF-1".to_string(), "REF-2".to_string()],
        );
        allowed_codes.insert("S-2".to_string(), Vec::new());

        let mut quotes = HashMap::new();
        quotes.insert(
            "PR-1".to_string(),
            PriceQuote {
                unit_price: Decimal::new(250, 2),
                discount_pct: money(10),
                unit_qty: 12,
            },
        );
        quotes.insert(
            "PR-2".to_string(),
            PriceQuote {
                unit_price: money(10),
                discount_pct: Decimal::ZERO,
                unit_qty: 6,
            },
        );

        Self {
            territories: vec![
                Territory {
                    id: "T-1".to_string(),
                    name: "North".to_string(),
                },
                Territory {
                    id: "T-2".to_string(),
                    name: "South".to_string(),
                },
            ],
            customers: vec![
                Customer {
                    id: "C-1".to_string(),
                    name: "Acme Farms".to_string(),
                    territory_id: "T-1".to_string(),
                    addresses: vec![DeliveryAddress {
                        id: Some("AD-1".to_string()),
                        label: "Main Street Depot".to_string(),
                    }],
                },
                Customer {
                    id: "C-2".to_string(),
                    name: "Bell Growers".to_string(),
                    territory_id: "T-1".to_string(),
                    addresses: vec![
                        DeliveryAddress {
                            id: Some("AD-2".to_string()),
                            label: "North Barn".to_string(),
                        },
                        DeliveryAddress {
                            id: Some("AD-3".to_string()),
                            label: "South Barn".to_string(),
                        },
                    ],
                },
                Customer {
                    id: "C-3".to_string(),
                    name: "Delta Agro".to_string(),
                    territory_id: "T-2".to_string(),
                    addresses: Vec::new(),
                },
            ],
            policies,
            reference_policies: vec![
                ReferencePolicy {
                    id: "R-1".to_string(),
                    code: "REF-1".to_string(),
                    remaining_amount: money(800),
                },
                ReferencePolicy {
                    id: "R-2".to_string(),
                    code: "REF-2".to_string(),
                    remaining_amount: money(300),
                },
            ],
            allowed_codes,
            products: vec![
                Product {
                    id: "PR-1".to_string(),
                    code: "WID".to_string(),
                    name: "Widget".to_string(),
                    list_price: Decimal::new(250, 2),
                },
                Product {
                    id: "PR-2".to_string(),
                    code: "GAD".to_string(),
                    name: "Gadget".to_string(),
                    list_price: money(10),
                },
            ],
            packagings: vec![
                Packaging {
                    id: "PK-1".to_string(),
                    name: "Box of 12".to_string(),
                    product_id: "PR-1".to_string(),
                    unit_qty: 12,
                },
                Packaging {
                    id: "PK-2".to_string(),
                    name: "Single".to_string(),
                    product_id: "PR-1".to_string(),
                    unit_qty: 1,
                },
                Packaging {
                    id: "PK-3".to_string(),
                    name: "Case of 6".to_string(),
                    product_id: "PR-2".to_string(),
                    unit_qty: 6,
                },
            ],
            quotes,
            warehouses: vec![
                Warehouse {
                    id: "W-1".to_string(),
                    name: "Central".to_string(),
                },
                Warehouse {
                    id: "W-2".to_string(),
                    name: "Harbour".to_string(),
                },
            ],
        }
    }
}

/// [`LookupGateway`] over a [`CatalogData`].
#[derive(Debug, Default)]
pub struct InMemoryLookup {
    data: Mutex<CatalogData>,
    failure: Mutex<Option<GatewayError>>,
    calls: Mutex<Vec<String>>,
    /// Closing it parks every lookup until reopened.
    pub gate: Gate,
}

impl InMemoryLookup {
    pub fn new(data: CatalogData) -> Self {
        Self {
            data: Mutex::new(data),
            ..Self::default()
        }
    }

    pub fn sample() -> Self {
        Self::new(CatalogData::sample())
    }

    /// Edit the served data in place.
    pub fn update(&self, edit: impl FnOnce(&mut CatalogData)) {
        edit(&mut self.data.lock().unwrap());
    }

    /// Every subsequent call fails with `error` until cleared.
    pub fn fail_with(&self, error: Option<GatewayError>) {
        *self.failure.lock().unwrap() = error;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, call: String) -> GatewayResult<CatalogData> {
        self.calls.lock().unwrap().push(call);
        self.gate.pass().await;
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.data.lock().unwrap().clone())
    }
}

#[async_trait]
impl LookupGateway for InMemoryLookup {
    async fn territories(&self) -> GatewayResult<Vec<Territory>> {
        Ok(self.enter("territories".to_string()).await?.territories)
    }

    async fn customers(&self, territory_id: &str) -> GatewayResult<Vec<Customer>> {
        let data = self.enter(format!("customers:{territory_id}")).await?;
        Ok(data
            .customers
            .into_iter()
            .filter(|c| c.territory_id == territory_id)
            .collect())
    }

    async fn policies(
        &self,
        customer_id: &str,
        policy_type: PolicyType,
    ) -> GatewayResult<Vec<Policy>> {
        let mut data = self.enter(format!("policies:{customer_id}:{policy_type}")).await?;
        Ok(data.policies.remove(&policy_type).unwrap_or_default())
    }

    async fn reference_policies(&self, customer_id: &str) -> GatewayResult<Vec<ReferencePolicy>> {
        Ok(self
            .enter(format!("reference_policies:{customer_id}"))
            .await?
            .reference_policies)
    }

    async fn allowed_reference_codes(
        &self,
        policy_id: &str,
        candidate_codes: &[String],
    ) -> GatewayResult<Vec<String>> {
        let mut data = self
            .enter(format!("allowed_reference_codes:{policy_id}"))
            .await?;
        let allowed = data.allowed_codes.remove(policy_id).unwrap_or_default();
        Ok(candidate_codes
            .iter()
            .filter(|code| allowed.contains(code))
            .cloned()
            .collect())
    }

    async fn products(
        &self,
        policy_id: &str,
        reference_policy_id: Option<&str>,
    ) -> GatewayResult<Vec<Product>> {
        let call = match reference_policy_id {
            Some(reference) => format!("products:{policy_id}:{reference}"),
            None => format!("products:{policy_id}"),
        };
        Ok(self.enter(call).await?.products)
    }

    async fn packagings(&self, product_id: &str) -> GatewayResult<Vec<Packaging>> {
        let data = self.enter(format!("packagings:{product_id}")).await?;
        Ok(data
            .packagings
            .into_iter()
            .filter(|p| p.product_id == product_id)
            .collect())
    }

    async fn price_quote(
        &self,
        customer_id: &str,
        policy_id: &str,
        product_id: &str,
    ) -> GatewayResult<PriceQuote> {
        let mut data = self
            .enter(format!("price_quote:{customer_id}:{policy_id}:{product_id}"))
            .await?;
        data.quotes
            .remove(product_id)
            .ok_or_else(|| not_found("lookup", format!("no price for {product_id}")))
    }

    async fn warehouses(&self) -> GatewayResult<Vec<Warehouse>> {
        Ok(self.enter("warehouses".to_string()).await?.warehouses)
    }
}

/// [`ErpOrderService`] answering from a queue of scripted responses.
/// Once the queue is empty every call is acknowledged with a fresh
/// `order_id`/`order_sequence` pair.
#[derive(Debug, Default)]
pub struct RecordingErp {
    /// Closing it parks submissions and confirmations until reopened.
    pub gate: Gate,
    responses: Mutex<VecDeque<GatewayResult<ErpOrderAck>>>,
    submitted: Mutex<Vec<ErpOrderRequest>>,
    confirmed: Mutex<Vec<ErpConfirmRequest>>,
}

impl RecordingErp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(&self, response: GatewayResult<ErpOrderAck>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn submitted(&self) -> Vec<ErpOrderRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn confirmed(&self) -> Vec<ErpConfirmRequest> {
        self.confirmed.lock().unwrap().clone()
    }

    fn next(&self, serial: usize) -> GatewayResult<ErpOrderAck> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ErpOrderAck {
                    order_id: Some(format!("{}", 1000 + serial)),
                    order_sequence: Some(format!("SO{:04}", serial)),
                    state: Some("sale".to_string()),
                })
            })
    }
}

#[async_trait]
impl ErpOrderService for RecordingErp {
    async fn submit_order(&self, request: &ErpOrderRequest) -> GatewayResult<ErpOrderAck> {
        let serial = {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(request.clone());
            submitted.len()
        };
        self.gate.pass().await;
        self.next(serial)
    }

    async fn confirm_order(&self, request: &ErpConfirmRequest) -> GatewayResult<ErpOrderAck> {
        let serial = {
            let mut confirmed = self.confirmed.lock().unwrap();
            confirmed.push(request.clone());
            confirmed.len()
        };
        self.gate.pass().await;
        self.next(serial)
    }
}

/// [`LocalOrderStore`] backed by a map, with switchable write failures.
#[derive(Debug, Default)]
pub struct RecordingStore {
    orders: Mutex<HashMap<String, SalesOrder>>,
    created: Mutex<Vec<LocalOrderRequest>>,
    assignments: Mutex<Vec<(String, WarehouseAssignment)>>,
    write_failure: Mutex<Option<GatewayError>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order as if it had arrived from another channel.
    pub fn insert(&self, order: SalesOrder) {
        self.orders.lock().unwrap().insert(order.id.clone(), order);
    }

    pub fn fail_writes(&self, error: Option<GatewayError>) {
        *self.write_failure.lock().unwrap() = error;
    }

    pub fn created(&self) -> Vec<LocalOrderRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn assignments(&self) -> Vec<(String, WarehouseAssignment)> {
        self.assignments.lock().unwrap().clone()
    }

    fn check_write(&self) -> GatewayResult<()> {
        match self.write_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LocalOrderStore for RecordingStore {
    async fn create_order(&self, request: &LocalOrderRequest) -> GatewayResult<String> {
        self.created.lock().unwrap().push(request.clone());
        self.check_write()?;

        let local_id = format!("local-{}", self.created.lock().unwrap().len());
        let order = SalesOrder {
            id: local_id.clone(),
            order_id: Some(request.order_id.clone()),
            order_sequence: Some(request.order_sequence.clone()),
            customer_id: request.customer_id.clone(),
            lines: request.lines.clone(),
            status: request.status.clone(),
            odoo_status: Some(request.odoo_status.clone()),
            warehouse_id: Some(request.warehouse_id.clone()),
        };
        self.insert(order);
        Ok(local_id)
    }

    async fn get_order(&self, local_id: &str) -> GatewayResult<SalesOrder> {
        self.orders
            .lock()
            .unwrap()
            .get(local_id)
            .cloned()
            .ok_or_else(|| not_found("local-api", format!("order {local_id}")))
    }

    async fn assign_warehouse(
        &self,
        local_id: &str,
        assignment: &WarehouseAssignment,
    ) -> GatewayResult<()> {
        self.assignments
            .lock()
            .unwrap()
            .push((local_id.to_string(), assignment.clone()));
        self.check_write()?;

        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(local_id)
            .ok_or_else(|| not_found("local-api", format!("order {local_id}")))?;
        order.warehouse_id = Some(assignment.warehouse_id.clone());
        order.order_id = Some(assignment.order_id.clone());
        order.order_sequence = Some(assignment.order_sequence.clone());
        order.odoo_status = Some(assignment.odoo_status.clone());
        Ok(())
    }
}

/// Pick a policy and product on an open session and enter a pack count,
/// resolving every lookup along the way. Packaging falls out of the quote.
pub async fn fill_draft(
    resolver: &SelectionResolver,
    session: &mut ComposeSession,
    policy_id: &str,
    product_id: &str,
    pack_count: u32,
) {
    let ticket = session.select_policy(policy_id).unwrap();
    resolver.run(session, ticket).await.unwrap();
    let tickets = session.select_product(product_id).unwrap();
    resolver.run_all(session, tickets).await.unwrap();
    session
        .set_field("pack_count", &serde_json::json!(pack_count))
        .unwrap();
}

/// Session over [`CatalogData::sample`] with territory `T-1`, customer
/// `C-1`, credit policy `P-1`, warehouse `W-1`, and a complete draft of
/// `pack_count` boxes of `PR-1` at 27.00 a box.
pub async fn drafted_session(resolver: &SelectionResolver, pack_count: u32) -> ComposeSession {
    let mut session = ComposeSession::new();
    let ticket = session.select_territory("T-1").unwrap();
    resolver.run(&mut session, ticket).await.unwrap();
    session.select_customer("C-1").unwrap();
    let ticket = session.select_policy_type(PolicyType::Credit).unwrap();
    resolver.run(&mut session, ticket).await.unwrap();
    fill_draft(resolver, &mut session, "P-1", "PR-1", pack_count).await;
    session
        .select_warehouse(Warehouse {
            id: "W-1".to_string(),
            name: "Central".to_string(),
        })
        .unwrap();
    session
}

//! Demo shop workload
//!
//! A small in-process application for the `mtrace` binary to trace. Worker
//! threads place and cancel orders in a loop; every seventh order fails with
//! an out-of-stock error so failure counts show up in the table.
//!
//! ```text
//! shop::orders::OrderService     loader#1  place_order, cancel_order
//! shop::inventory::StockLedger   loader#1  reserve, release
//! shop::catalog::PriceCatalog    loader#2  lookup
//! shop::billing::Invoice         loader#1  render   (sealed, never probed)
//! ```

use log::debug;
use mtrace_common::LoaderId;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use crate::runtime::{ClassHandle, InProcessRuntime};

pub const APP_LOADER: LoaderId = LoaderId(1);
pub const CATALOG_LOADER: LoaderId = LoaderId(2);

/// Pause between two orders of the same worker
const ORDER_PAUSE: Duration = Duration::from_millis(2);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShopError {
    #[error("sku {0} is out of stock")]
    OutOfStock(u64),

    #[error("order {0} was never placed")]
    UnknownOrder(u64),
}

/// Handles to the demo classes.
pub struct DemoApp {
    orders: ClassHandle,
    stock: ClassHandle,
    catalog: ClassHandle,
    invoice: ClassHandle,
    next_order: AtomicU64,
}

/// Define the demo classes in `runtime`.
#[must_use]
pub fn install_demo_classes(runtime: &InProcessRuntime) -> DemoApp {
    DemoApp {
        orders: runtime.define_class(
            "shop::orders::OrderService",
            APP_LOADER,
            &["place_order", "cancel_order"],
        ),
        stock: runtime.define_class(
            "shop::inventory::StockLedger",
            APP_LOADER,
            &["reserve", "release"],
        ),
        catalog: runtime.define_class("shop::catalog::PriceCatalog", CATALOG_LOADER, &["lookup"]),
        invoice: runtime.define_sealed_class("shop::billing::Invoice", APP_LOADER, &["render"]),
        next_order: AtomicU64::new(1),
    }
}

impl DemoApp {
    /// Place one order. Returns the order id and its price in cents.
    ///
    /// # Errors
    /// Returns [`ShopError::OutOfStock`] for every seventh order.
    pub fn place_order(&self) -> Result<(u64, u64), ShopError> {
        let id = self.next_order.fetch_add(1, Ordering::Relaxed);
        self.orders.invoke("place_order", || {
            let sku = id % 13;
            let price = self.lookup(sku);
            self.reserve(id, sku)?;
            let _ = self.render_invoice(id, price);
            Ok((id, price))
        })
    }

    /// Cancel a previously placed order.
    ///
    /// # Errors
    /// Returns [`ShopError::UnknownOrder`] for ids that were never handed out.
    pub fn cancel_order(&self, id: u64) -> Result<(), ShopError> {
        self.orders.invoke("cancel_order", || {
            if id == 0 || id >= self.next_order.load(Ordering::Relaxed) {
                return Err(ShopError::UnknownOrder(id));
            }
            self.release(id);
            Ok(())
        })
    }

    fn lookup(&self, sku: u64) -> u64 {
        self.catalog.call("lookup", || {
            work(Duration::from_micros(50 + sku * 10));
            499 + sku * 100
        })
    }

    fn reserve(&self, id: u64, sku: u64) -> Result<(), ShopError> {
        self.stock.invoke("reserve", || {
            work(Duration::from_micros(200));
            if id % 7 == 0 {
                Err(ShopError::OutOfStock(sku))
            } else {
                Ok(())
            }
        })
    }

    fn release(&self, id: u64) {
        self.stock.call("release", || work(Duration::from_micros(100 + id % 5 * 20)));
    }

    fn render_invoice(&self, id: u64, price: u64) -> String {
        self.invoice.call("render", || format!("order {id}: {}.{:02}", price / 100, price % 100))
    }
}

/// Start `threads` workers placing orders until `stop` is set.
///
/// # Errors
/// Returns an error if a thread cannot be spawned; workers already started
/// keep running until `stop` is set.
pub fn spawn_workers(
    app: &Arc<DemoApp>,
    threads: usize,
    stop: &Arc<AtomicBool>,
) -> io::Result<Vec<JoinHandle<()>>> {
    (0..threads)
        .map(|n| {
            let app = Arc::clone(app);
            let stop = Arc::clone(stop);
            thread::Builder::new()
                .name(format!("shop-worker-{n}"))
                .spawn(move || run_worker(&app, &stop))
        })
        .collect()
}

fn run_worker(app: &DemoApp, stop: &AtomicBool) {
    let mut placed = 0_u64;
    while !stop.load(Ordering::Relaxed) {
        match app.place_order() {
            Ok((id, _)) => {
                placed += 1;
                if placed % 5 == 0 {
                    let _ = app.cancel_order(id);
                }
            }
            Err(e) => debug!("order failed: {e}"),
        }
        thread::sleep(ORDER_PAUSE);
    }
    debug!("{} stopping after {placed} orders", thread::current().name().unwrap_or("worker"));
}

fn work(duration: Duration) {
    thread::sleep(duration);
}

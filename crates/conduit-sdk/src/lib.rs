pub mod commerce;
pub mod error;
pub mod expiration;
pub mod invoice;
pub mod orders;
pub mod service;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Rejection, Result};

// Re-export nostr-sdk for app-layer use
pub use nostr_sdk;

// Wire vocabulary, envelope codec and classifier
pub use commerce::{
    ClassifiedEvent, CommerceEventType, CommerceMessage, ContactInfo, ItemRef, ORDER_MESSAGE_KIND,
    OrderDetails, OrderEnvelope, OrderItem, OrderRequest, PAYMENT_RECEIPT_KIND, PaymentMethod,
    PaymentReceiptDetails, PaymentRequestDetails, ReceiptRequest, ShippingSelection,
    ShippingStatus, ShippingUpdateDetails, StatusUpdateDetails, TagView, WorkflowStatus,
    build_gift_wrap_filter, build_order_rumor, build_receipt_rumor, classify_rumor, encode_order,
    encode_receipt, gift_wrap_seal, open_seal, process_gift_wrap, seal_rumor, unwrap_gift_wrap,
};

// Invoices and expiry
pub use expiration::{
    ExpirationCountdown, ExpirySource, ResolvedExpiration, expiration_of, format_time_remaining,
    resolve_expiration,
};
pub use invoice::{LightningInvoiceInfo, lightning_invoice_of, parse_bolt11};

// Read model
pub use orders::{
    NoopPersistence, OrderGroup, OrderPersistence, OrderStore, PersistedOrders, ProcessingStatus,
    StoredCommerceEvent, TimelineEntry, UnreadCounts, build_timeline,
};

// Relay gateway
pub use service::{
    DEFAULT_RELAYS, ORDERS_STORAGE_KEY, OrderNotification, OrderService, OrdersConfig,
    build_relay_list_filter, parse_relay_list, select_publish_relays,
};

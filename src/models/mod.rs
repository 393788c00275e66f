/// Implements the string mapping for an enum stored as a text column.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::models::UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(crate::models::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = crate::models::UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

mod bookkeeping;
mod customer;
mod document;
mod flow_status;
mod invoice;
mod offer;
mod order;
mod time_entry;

pub use bookkeeping::{BookkeepingEntry, EntryKind, EntryStatus};
pub use customer::{Customer, CustomerInput};
pub use document::{Document, DocumentType};
pub use flow_status::{FlowPatch, FlowStatus};
pub use invoice::{Invoice, InvoiceStatus};
pub use offer::{Offer, OfferStatus};
pub(crate) use offer::number_like;
pub use order::{Order, OrderData, OrderRow, OrderStatus, RowSource};
pub use time_entry::{TimeEntry, TimeFilter};

/// Error for a status or type column holding a value outside its vocabulary.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

pub mod assistant;
pub mod mailer;
pub mod ocr;
pub mod storage;

pub use assistant::{Assistant, AudioClip, OfferDraft, OpenAiAssistant};
pub use mailer::{LogMailer, MailAttachment, Mailer, OutgoingMail, SmtpMailer};
pub use ocr::{HttpOcrClient, ImageUpload, OcrClient, OcrResult};
pub use storage::{LocalStore, MemoryObjectStore, ObjectStore, SupabaseStore};

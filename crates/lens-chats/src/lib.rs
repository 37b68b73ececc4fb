//! Chat discovery and content extraction for chatlens.
//!
//! `path_codec` recovers workspace directories from the agent's lossy project folder names,
//! `discovery` walks the on-disk chat stores, `chat_store` reads a single store read-only and
//! `extractor` turns raw blob payloads into clean speaker-tagged messages.
pub mod boilerplate;
pub mod chat_store;
pub mod discovery;
pub mod extractor;
pub mod path_codec;
mod types;

pub use boilerplate::BoilerplatePolicy;
pub use chat_store::{ChatMeta, ChatStore, ChatStoreError, NamedChatSkipRule, STORE_FILE_NAME};
pub use discovery::{workspace_hash, ChatDiscovery, ChatLocation, WorkspaceIndex};
pub use extractor::{extract_text_content, extract_user_query, ContentExtractor};
pub use path_codec::{
    encode_workspace_path, DirectoryProbe, FsProbe, PathCodec, WORKSPACE_SEPARATOR,
};
pub use types::{BlobRecord, Message, MessageRole};

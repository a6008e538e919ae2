//! Typed access to documents.
//!
//! Maps [`Talk`], [`Registration`] and [`User`] onto their collections and
//! builds the [`WriteOp`]s services commit.

use crate::document_store::{Collection, Document, DocumentStore, Query, Revision, StoreError, WriteOp};
use crate::ids::{TalkId, UserId};
use crate::model::{Registration, Talk, User};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A record together with the revision it was read at.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    /// Decoded record.
    pub value: T,
    /// Revision to pass as `expected` when writing it back.
    pub revision: Revision,
}

/// A type stored as a document in a fixed collection.
pub trait Record: Serialize + DeserializeOwned {
    /// Collection holding records of this type.
    const COLLECTION: Collection;

    /// Document id of this record.
    fn document_id(&self) -> String;

    /// Decode a stored document.
    ///
    /// # Errors
    ///
    /// `Serialization` if the body does not match the record shape.
    fn decode(document: Document) -> Result<Versioned<Self>, StoreError> {
        let value = serde_json::from_value(document.data).map_err(|e| {
            StoreError::Serialization(format!("{}/{}: {e}", document.collection, document.id))
        })?;
        Ok(Versioned {
            value,
            revision: document.revision,
        })
    }

    /// Encode the record body.
    ///
    /// # Errors
    ///
    /// `Serialization` if encoding fails.
    fn encode(&self) -> Result<Value, StoreError> {
        serde_json::to_value(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Create this record.
    ///
    /// # Errors
    ///
    /// `Serialization` if encoding fails.
    fn create_op(&self) -> Result<WriteOp, StoreError> {
        Ok(WriteOp::create(Self::COLLECTION, self.document_id(), self.encode()?))
    }

    /// Replace this record, conditional on `expected`.
    ///
    /// # Errors
    ///
    /// `Serialization` if encoding fails.
    fn update_op(&self, expected: Revision) -> Result<WriteOp, StoreError> {
        Ok(WriteOp::update(
            Self::COLLECTION,
            self.document_id(),
            self.encode()?,
            Some(expected),
        ))
    }

    /// Delete this record, conditional on `expected`.
    fn delete_op(&self, expected: Revision) -> WriteOp {
        WriteOp::delete(Self::COLLECTION, self.document_id(), Some(expected))
    }
}

impl Record for Talk {
    const COLLECTION: Collection = Collection::Talks;

    fn document_id(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Registration {
    const COLLECTION: Collection = Collection::Registrations;

    fn document_id(&self) -> String {
        self.id.to_string()
    }
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn document_id(&self) -> String {
        self.id.to_string()
    }
}

/// Fetch one record by id.
///
/// # Errors
///
/// Propagates store and decoding failures.
pub async fn fetch<R: Record>(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<Versioned<R>>, StoreError> {
    store
        .get(R::COLLECTION, id)
        .await?
        .map(R::decode)
        .transpose()
}

/// Fetch every record matching `query`.
///
/// # Errors
///
/// Propagates store and decoding failures.
pub async fn find<R: Record>(
    store: &dyn DocumentStore,
    query: Query,
) -> Result<Vec<Versioned<R>>, StoreError> {
    store
        .query(query)
        .await?
        .into_iter()
        .map(R::decode)
        .collect()
}

/// Decode every document of a snapshot.
///
/// # Errors
///
/// `Serialization` if any document does not decode.
pub fn decode_all<R: Record>(documents: Vec<Document>) -> Result<Vec<R>, StoreError> {
    documents
        .into_iter()
        .map(|d| R::decode(d).map(|v| v.value))
        .collect()
}

/// Query for the registrations of one talk.
#[must_use]
pub fn registrations_of(talk_id: TalkId) -> Query {
    Query::new(Collection::Registrations).filter("talk_id", Value::String(talk_id.to_string()))
}

/// Query for the registrations held by one (normalized) email.
#[must_use]
pub fn registrations_by(email: &str) -> Query {
    Query::new(Collection::Registrations).filter("email", Value::String(email.to_string()))
}

/// Fetch a talk.
///
/// # Errors
///
/// Propagates store and decoding failures.
pub async fn fetch_talk(
    store: &dyn DocumentStore,
    talk_id: TalkId,
) -> Result<Option<Versioned<Talk>>, StoreError> {
    fetch(store, &talk_id.to_string()).await
}

/// Fetch a user.
///
/// # Errors
///
/// Propagates store and decoding failures.
pub async fn fetch_user(
    store: &dyn DocumentStore,
    user_id: &UserId,
) -> Result<Option<Versioned<User>>, StoreError> {
    fetch(store, user_id.as_str()).await
}

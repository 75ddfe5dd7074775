use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{audit::AuditEntry, election::Election, vote::VoteRecord, voter::Voter};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}

impl MongoCollection for Voter {
    const NAME: &'static str = "voters";
}

impl MongoCollection for VoteRecord {
    const NAME: &'static str = "votes";
}

impl MongoCollection for AuditEntry {
    const NAME: &'static str = "audit_log";
}

impl MongoCollection for Counter {
    const NAME: &'static str = "counters";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // A wallet can only be bound to one voter.
    let wallet_index = IndexModel::builder()
        .keys(doc! {"wallet_address": 1})
        .options(
            IndexOptions::builder()
                .unique(true)
                .sparse(true)
                .build(),
        )
        .build();
    Coll::<Voter>::from_db(db)
        .create_index(wallet_index, None)
        .await?;

    // One vote record per voter per election.
    let vote_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "voter_id": 1})
        .options(unique)
        .build();
    Coll::<VoteRecord>::from_db(db)
        .create_index(vote_index, None)
        .await?;

    // Expiry sweep.
    let expiry_index = IndexModel::builder()
        .keys(doc! {"status": 1, "end_time": 1})
        .build();
    Coll::<Election>::from_db(db)
        .create_index(expiry_index, None)
        .await?;

    // Audit log lookups by election.
    let audit_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "timestamp": 1})
        .build();
    Coll::<AuditEntry>::from_db(db)
        .create_index(audit_index, None)
        .await?;

    Ok(())
}

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    options::FindOptions,
    Client, Database,
};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    common::election::{ElectionId, ElectionStatus},
    db::{audit::AuditEntry, election::Election, vote::VoteRecord, voter::Voter},
    mongodb::{
        ensure_election_id_counter_exists, ensure_indexes_exist, is_duplicate_key_error,
        u32_id_filter, Coll, Counter, Id, ELECTION_ID_COUNTER_ID,
    },
};

use super::ElectionStore;

/// MongoDB-backed store.
pub struct MongoStore {
    db: Database,
    elections: Coll<Election>,
    voters: Coll<Voter>,
    votes: Coll<VoteRecord>,
    audit: Coll<AuditEntry>,
    counters: Coll<Counter>,
}

impl MongoStore {
    /// Connect to the database and make sure indexes and counters exist.
    pub async fn connect(db_uri: &str, db_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(db_uri).await?;
        let db = client.database(db_name);
        ensure_indexes_exist(&db).await?;

        let store = Self::from_db(db);
        ensure_election_id_counter_exists(&store.counters).await?;
        Ok(store)
    }

    fn from_db(db: Database) -> Self {
        Self {
            elections: Coll::from_db(&db),
            voters: Coll::from_db(&db),
            votes: Coll::from_db(&db),
            audit: Coll::from_db(&db),
            counters: Coll::from_db(&db),
            db,
        }
    }

    fn sorted_by(key: &str) -> FindOptions {
        FindOptions::builder().sort(doc! { key: 1 }).build()
    }

    async fn election_exists(&self, id: ElectionId) -> Result<bool> {
        Ok(self
            .elections
            .count_documents(u32_id_filter(id), None)
            .await?
            > 0)
    }
}

fn wallet_in_use(voter: &Voter) -> Error {
    Error::WalletAlreadyBound(format!(
        "{} belongs to another voter",
        voter.wallet_address.as_deref().unwrap_or_default()
    ))
}

#[rocket::async_trait]
impl ElectionStore for MongoStore {
    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    async fn next_election_id(&self) -> Result<ElectionId> {
        let next = Counter::next(&self.counters, ELECTION_ID_COUNTER_ID).await?;
        ElectionId::try_from(next)
            .map_err(|_| Error::Internal(format!("Election ID counter overflowed: {next}")))
    }

    async fn insert_election(&self, election: &Election) -> Result<()> {
        self.elections.insert_one(election, None).await?;
        Ok(())
    }

    async fn load_election(&self, id: ElectionId) -> Result<Option<Election>> {
        Ok(self.elections.find_one(u32_id_filter(id), None).await?)
    }

    async fn save_election(&self, election: &mut Election) -> Result<()> {
        let expected = election.version;
        let mut filter = u32_id_filter(election.id);
        filter.insert("version", expected as i64);

        let mut updated = election.clone();
        updated.version = expected + 1;
        let result = self.elections.replace_one(filter, &updated, None).await?;

        if result.matched_count == 0 {
            return if self.election_exists(election.id).await? {
                Err(Error::ConcurrentModification(election.id))
            } else {
                Err(Error::ElectionNotFound(election.id))
            };
        }
        election.version = updated.version;
        Ok(())
    }

    async fn list_elections(&self) -> Result<Vec<Election>> {
        Ok(self
            .elections
            .find(None, Self::sorted_by("_id"))
            .await?
            .try_collect()
            .await?)
    }

    async fn list_expirable(&self, now: DateTime<Utc>) -> Result<Vec<Election>> {
        let filter = doc! {
            "status": { "$ne": ElectionStatus::Completed },
            "end_time": { "$lt": BsonDateTime::from_chrono(now) },
        };
        Ok(self
            .elections
            .find(filter, Self::sorted_by("_id"))
            .await?
            .try_collect()
            .await?)
    }

    async fn delete_election(&self, id: ElectionId) -> Result<bool> {
        let result = self.elections.delete_one(u32_id_filter(id), None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn insert_voter(&self, voter: &Voter) -> Result<()> {
        match self.voters.insert_one(voter, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key_error(&err) => Err(wallet_in_use(voter)),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_voter(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self.voters.find_one(id.as_doc(), None).await?)
    }

    async fn list_voters(&self) -> Result<Vec<Voter>> {
        Ok(self
            .voters
            .find(None, Self::sorted_by("registered_at"))
            .await?
            .try_collect()
            .await?)
    }

    async fn save_voter(&self, voter: &Voter) -> Result<()> {
        let result = match self.voters.replace_one(voter.id.as_doc(), voter, None).await {
            Ok(result) => result,
            Err(err) if is_duplicate_key_error(&err) => return Err(wallet_in_use(voter)),
            Err(err) => return Err(err.into()),
        };
        if result.matched_count == 0 {
            return Err(Error::VoterNotFound(voter.id));
        }
        Ok(())
    }

    async fn insert_vote(&self, vote: &VoteRecord) -> Result<()> {
        match self.votes.insert_one(vote, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key_error(&err) => Err(Error::AlreadyVoted {
                election: vote.election_id,
                voter: vote.voter_id,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn votes_for_election(&self, election: ElectionId) -> Result<Vec<VoteRecord>> {
        let filter = doc! { "election_id": election };
        Ok(self
            .votes
            .find(filter, Self::sorted_by("cast_at"))
            .await?
            .try_collect()
            .await?)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.audit.insert_one(entry, None).await?;
        Ok(())
    }

    async fn audit_log(&self, election: Option<ElectionId>) -> Result<Vec<AuditEntry>> {
        let filter: Option<Document> = election.map(|id| doc! { "election_id": id });
        Ok(self
            .audit
            .find(filter, Self::sorted_by("timestamp"))
            .await?
            .try_collect()
            .await?)
    }
}

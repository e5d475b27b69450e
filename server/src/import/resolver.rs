use shared::{score, user_id, EventDay, ImportedEvent, User};
use tracing::{error, trace};

use crate::db::{StoreError, DB};

use super::locks::IdentityLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Scored { xp: u32 },
    Blacklisted,
}

/// Applies decoded events to the user documents they touch.
pub struct Resolver<'a> {
    db: &'a DB,
    locks: &'a IdentityLocks,
    ranking: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(db: &'a DB, locks: &'a IdentityLocks, ranking: bool) -> Self {
        Self { db, locks, ranking }
    }

    /// Resolves the actor (and the owner of a personal repository), updates
    /// language counters, experience and the repository snapshot, and writes
    /// the ledger entry.
    ///
    /// Lookup failures abort the event. Write failures are logged and do not
    /// undo what was already applied.
    pub async fn apply(&self, event: &ImportedEvent) -> Result<Resolution, StoreError> {
        let actor_id = user_id(&event.actor.login);
        let repository = &event.repository;
        let owner_id = (repository.is_personal() && !repository.owner.is_empty())
            .then(|| user_id(&repository.owner));

        let _guard = self
            .locks
            .lock_all(std::iter::once(actor_id.as_str()).chain(owner_id.as_deref()))
            .await;

        if self.db.is_blacklisted(&actor_id).await? {
            trace!("Skipping event from blacklisted user {actor_id}");
            return Ok(Resolution::Blacklisted);
        }

        let mut actor = self.db.get_or_register_user(&event.actor.login).await?;
        actor.set_profile(&event.actor.name, &event.actor.gravatar_id);

        let mut owner: Option<User> = None;
        if let Some(owner_id) = &owner_id {
            if *owner_id == actor.id {
                actor
                    .repository_mut(repository.id, &repository.name)
                    .snapshot(repository);
            } else {
                let mut repo_owner = self.db.get_or_register_user(&repository.owner).await?;
                repo_owner
                    .repository_mut(repository.id, &repository.name)
                    .snapshot(repository);
                owner = Some(repo_owner);
            }
        }

        let kind = event.event_kind();
        let language = &repository.language;
        if let Some(kind) = kind {
            actor.language_mut(language).events.increment(kind.counter());
        }
        let xp = score(kind, repository.stargazers_count);

        if self.ranking {
            let entry = EventDay::new(
                event.kind_key(),
                language.clone(),
                actor.id.clone(),
                xp,
                repository.id,
                event.created_at.clone(),
            );
            if let Err(e) = self.db.register_event_day(&entry).await {
                error!("Failed to register ranking entry for {}: {e}", actor.id);
            }
        }

        actor.add_experience(language, xp);

        if let Err(e) = self.db.update_user(&actor).await {
            error!("Failed to update user {}: {e}", actor.id);
        }
        if let Some(owner) = owner {
            if let Err(e) = self.db.update_user(&owner).await {
                error!("Failed to update repository owner {}: {e}", owner.id);
            }
        }

        Ok(Resolution::Scored { xp })
    }
}

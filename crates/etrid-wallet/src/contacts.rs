//! Address book with favourites, tags and groups

use crate::check_address;
use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::username::UsernameRegistry;
use chrono::{DateTime, Utc};
use etrid_core::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub address: AccountId,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub notes: Option<String>,
    pub favorite: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl Contact {
    /// Nickname, then `@username`, then the address
    pub fn display_name(&self) -> String {
        match (&self.nickname, &self.username) {
            (Some(nick), _) => nick.clone(),
            (None, Some(user)) => format!("@{user}"),
            (None, None) => self.address.clone(),
        }
    }

    fn matches(&self, needle: &str) -> bool {
        let hit = |s: &str| s.to_lowercase().contains(needle);
        self.nickname.as_deref().is_some_and(hit)
            || self.username.as_deref().is_some_and(hit)
            || hit(&self.address)
            || self.tags.iter().any(|t| hit(t))
    }
}

#[derive(Clone, Debug, Default)]
pub struct ContactInput {
    pub address: Option<AccountId>,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ContactUpdate {
    pub nickname: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub favorite: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactGroup {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub contact_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Deterministic `hsl()` colour for an address avatar
pub fn avatar_color(address: &str) -> String {
    // hash = c + ((hash << 5) - hash), shifting in 32 bits and summing wide
    let hash = address.encode_utf16().fold(0i64, |acc, c| {
        let shifted = (acc as i32).wrapping_shl(5) as i64;
        i64::from(c) + shifted - acc
    });
    format!("hsl({}, 70%, 60%)", hash.unsigned_abs() % 360)
}

pub struct Contacts {
    clock: Arc<dyn Clock>,
    contacts: Vec<Contact>,
    groups: Vec<ContactGroup>,
}

impl Contacts {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            contacts: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Add a contact by address or by a username the registry can resolve
    ///
    /// A contact added by address picks up its username by reverse lookup.
    pub fn add(&mut self, input: ContactInput, usernames: &UsernameRegistry) -> ServiceResult<&Contact> {
        let address = match (input.address, &input.username) {
            (Some(address), _) => address,
            (None, Some(name)) => usernames
                .resolve(name)
                .cloned()
                .ok_or_else(|| ServiceError::invalid(format!("Failed to resolve username '{name}'")))?,
            (None, None) => {
                return Err(ServiceError::invalid(
                    "Either contact address or username is required",
                ))
            }
        };
        check_address(&address)?;
        if self.contacts.iter().any(|c| c.address == address) {
            return Err(ServiceError::AlreadyExists(format!("Contact {address}")));
        }
        let username = input
            .username
            .map(|u| crate::username::normalize(&u))
            .or_else(|| usernames.reverse_resolve(&address).map(str::to_string));

        let now = self.clock.now();
        self.contacts.push(Contact {
            id: Uuid::new_v4(),
            address,
            username,
            nickname: input.nickname,
            notes: input.notes,
            favorite: false,
            tags: input.tags,
            created_at: now,
            updated_at: now,
            last_transaction_at: None,
        });
        self.contacts.last().ok_or(ServiceError::NotFound("Contact"))
    }

    pub fn get(&self, id: Uuid) -> ServiceResult<&Contact> {
        self.contacts
            .iter()
            .find(|c| c.id == id)
            .ok_or(ServiceError::NotFound("Contact"))
    }

    fn get_mut(&mut self, id: Uuid) -> ServiceResult<&mut Contact> {
        self.contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(ServiceError::NotFound("Contact"))
    }

    pub fn by_address(&self, address: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.address == address)
    }

    pub fn list(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn update(&mut self, id: Uuid, update: ContactUpdate) -> ServiceResult<&Contact> {
        let now = self.clock.now();
        let contact = self.get_mut(id)?;
        if let Some(nickname) = update.nickname {
            contact.nickname = Some(nickname).filter(|n| !n.is_empty());
        }
        if let Some(notes) = update.notes {
            contact.notes = Some(notes).filter(|n| !n.is_empty());
        }
        if let Some(tags) = update.tags {
            contact.tags = tags;
        }
        if let Some(favorite) = update.favorite {
            contact.favorite = favorite;
        }
        contact.updated_at = now;
        Ok(&*contact)
    }

    /// Remove the contact and drop it from every group
    pub fn remove(&mut self, id: Uuid) -> ServiceResult<Contact> {
        let index = self
            .contacts
            .iter()
            .position(|c| c.id == id)
            .ok_or(ServiceError::NotFound("Contact"))?;
        for group in &mut self.groups {
            group.contact_ids.retain(|c| *c != id);
        }
        Ok(self.contacts.remove(index))
    }

    /// Case-insensitive match on nickname, username, address or tag; a blank
    /// query returns everything
    pub fn search(&self, query: &str) -> Vec<&Contact> {
        let needle = query.trim().to_lowercase();
        self.contacts
            .iter()
            .filter(|c| needle.is_empty() || c.matches(&needle))
            .collect()
    }

    pub fn favorites(&self) -> Vec<&Contact> {
        self.contacts.iter().filter(|c| c.favorite).collect()
    }

    pub fn toggle_favorite(&mut self, id: Uuid) -> ServiceResult<bool> {
        let now = self.clock.now();
        let contact = self.get_mut(id)?;
        contact.favorite = !contact.favorite;
        contact.updated_at = now;
        Ok(contact.favorite)
    }

    /// Stamp the contact for `address` as transacted with now
    pub fn record_transaction(&mut self, address: &str) -> ServiceResult<()> {
        let now = self.clock.now();
        let contact = self
            .contacts
            .iter_mut()
            .find(|c| c.address == address)
            .ok_or(ServiceError::NotFound("Contact"))?;
        contact.last_transaction_at = Some(now);
        Ok(())
    }

    /// Contacts with transactions, most recent first
    pub fn recent(&self, limit: usize) -> Vec<&Contact> {
        let mut recent: Vec<&Contact> = self
            .contacts
            .iter()
            .filter(|c| c.last_transaction_at.is_some())
            .collect();
        recent.sort_by(|a, b| b.last_transaction_at.cmp(&a.last_transaction_at));
        recent.truncate(limit);
        recent
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&Contact> {
        self.contacts
            .iter()
            .filter(|c| c.tags.iter().any(|t| t == tag))
            .collect()
    }

    /// Every distinct tag, sorted
    pub fn tags(&self) -> Vec<String> {
        self.contacts
            .iter()
            .flat_map(|c| c.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn create_group(
        &mut self,
        name: &str,
        description: Option<String>,
        contact_ids: Vec<Uuid>,
    ) -> ServiceResult<&ContactGroup> {
        if name.trim().is_empty() {
            return Err(ServiceError::invalid("Group name is required"));
        }
        for id in &contact_ids {
            self.get(*id)?;
        }
        self.groups.push(ContactGroup {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            description,
            contact_ids,
            created_at: self.clock.now(),
        });
        self.groups.last().ok_or(ServiceError::NotFound("Group"))
    }

    pub fn groups(&self) -> &[ContactGroup] {
        &self.groups
    }

    pub fn group_members(&self, group_id: Uuid) -> ServiceResult<Vec<&Contact>> {
        let group = self
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .ok_or(ServiceError::NotFound("Group"))?;
        Ok(self
            .contacts
            .iter()
            .filter(|c| group.contact_ids.contains(&c.id))
            .collect())
    }
}

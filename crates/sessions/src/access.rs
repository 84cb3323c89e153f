//! Access registry: who may do what, and which chat owns which number.
//!
//! Administrators are fixed by configuration.  Resellers, entitled users and
//! the ownership mapping are persisted documents; every mutation is saved
//! before the in-memory copy changes, so a failed write leaves both views
//! identical and a successful reply is never ahead of the disk.

use std::collections::{BTreeMap, HashSet};

use parking_lot::RwLock;

use pb_domain::config::AccessConfig;
use pb_domain::error::Result;
use pb_domain::trace::TraceEvent;
use pb_domain::{AdminId, ChatId, PhoneNumber};

use crate::store::JsonStore;

pub const OWNERSHIP_DOC: &str = "user_numbers";
pub const ENTITLED_DOC: &str = "premium";
pub const RESELLERS_DOC: &str = "resellers";

/// Outcome of an idempotent add/remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Changed,
    Unchanged,
}

impl Membership {
    pub fn changed(self) -> bool {
        self == Membership::Changed
    }
}

pub struct AccessRegistry {
    store: JsonStore,
    administrators: HashSet<AdminId>,
    resellers: RwLock<Vec<AdminId>>,
    entitled: RwLock<Vec<AdminId>>,
    /// chat → phone.  Injective: no phone appears under two chats.
    ownership: RwLock<BTreeMap<ChatId, PhoneNumber>>,
}

impl AccessRegistry {
    /// Load every document from `store`, creating empty ones as needed.
    pub fn open(store: JsonStore, config: &AccessConfig) -> Result<Self> {
        let resellers = dedup(store.load_or_init(RESELLERS_DOC, Vec::new)?);
        let entitled = dedup(store.load_or_init(ENTITLED_DOC, Vec::new)?);
        let ownership = injective(store.load_or_init(OWNERSHIP_DOC, BTreeMap::new)?);

        tracing::info!(
            administrators = config.administrators.len(),
            resellers = resellers.len(),
            entitled = entitled.len(),
            bindings = ownership.len(),
            path = %store.root().display(),
            "access registry loaded"
        );

        Ok(Self {
            store,
            administrators: config.administrators.iter().copied().collect(),
            resellers: RwLock::new(resellers),
            entitled: RwLock::new(entitled),
            ownership: RwLock::new(ownership),
        })
    }

    // ── Roles ────────────────────────────────────────────────────────

    pub fn is_administrator(&self, id: AdminId) -> bool {
        self.administrators.contains(&id)
    }

    pub fn is_reseller(&self, id: AdminId) -> bool {
        self.resellers.read().contains(&id)
    }

    /// Administrator or reseller.
    pub fn is_owner(&self, id: AdminId) -> bool {
        self.is_administrator(id) || self.is_reseller(id)
    }

    pub fn is_entitled(&self, id: AdminId) -> bool {
        self.entitled.read().contains(&id)
    }

    pub fn resellers(&self) -> Vec<AdminId> {
        self.resellers.read().clone()
    }

    pub fn entitled(&self) -> Vec<AdminId> {
        self.entitled.read().clone()
    }

    pub fn add_reseller(&self, id: AdminId) -> Result<Membership> {
        self.mutate_set(&self.resellers, RESELLERS_DOC, id, true)
    }

    pub fn remove_reseller(&self, id: AdminId) -> Result<Membership> {
        self.mutate_set(&self.resellers, RESELLERS_DOC, id, false)
    }

    pub fn add_entitled(&self, id: AdminId) -> Result<Membership> {
        self.mutate_set(&self.entitled, ENTITLED_DOC, id, true)
    }

    pub fn remove_entitled(&self, id: AdminId) -> Result<Membership> {
        self.mutate_set(&self.entitled, ENTITLED_DOC, id, false)
    }

    // ── Ownership ────────────────────────────────────────────────────

    /// Bind `phone` to `chat`.  Overwrites the chat's previous number and
    /// evicts any other chat holding the same number.  Returns the chat's
    /// previous number, if any.
    pub fn bind_ownership(&self, chat: ChatId, phone: PhoneNumber) -> Result<Option<PhoneNumber>> {
        let mut guard = self.ownership.write();
        if guard.get(&chat) == Some(&phone) {
            return Ok(Some(phone));
        }

        let mut next = guard.clone();
        next.retain(|c, p| *c == chat || *p != phone);
        let previous = next.insert(chat, phone.clone());

        self.store.save(OWNERSHIP_DOC, &next)?;
        *guard = next;

        TraceEvent::OwnershipChanged {
            chat_id: chat.0,
            phone: Some(phone.to_string()),
        }
        .emit();
        Ok(previous)
    }

    /// Remove the chat's binding.  Returns the number it held.
    pub fn unbind_ownership(&self, chat: ChatId) -> Result<Option<PhoneNumber>> {
        let mut guard = self.ownership.write();
        if !guard.contains_key(&chat) {
            return Ok(None);
        }

        let mut next = guard.clone();
        let previous = next.remove(&chat);
        self.store.save(OWNERSHIP_DOC, &next)?;
        *guard = next;

        TraceEvent::OwnershipChanged {
            chat_id: chat.0,
            phone: None,
        }
        .emit();
        Ok(previous)
    }

    /// Remove whichever chat holds `phone`.  Returns that chat.
    pub fn unbind_phone(&self, phone: &PhoneNumber) -> Result<Option<ChatId>> {
        let Some(chat) = self.owner_of(phone) else {
            return Ok(None);
        };
        self.unbind_ownership(chat)?;
        Ok(Some(chat))
    }

    /// Reverse lookup by linear scan; the mapping holds one entry per bound
    /// session, so it stays small.
    pub fn owner_of(&self, phone: &PhoneNumber) -> Option<ChatId> {
        self.ownership
            .read()
            .iter()
            .find(|(_, p)| *p == phone)
            .map(|(c, _)| *c)
    }

    pub fn phone_of(&self, chat: ChatId) -> Option<PhoneNumber> {
        self.ownership.read().get(&chat).cloned()
    }

    pub fn bindings(&self) -> Vec<(ChatId, PhoneNumber)> {
        self.ownership
            .read()
            .iter()
            .map(|(c, p)| (*c, p.clone()))
            .collect()
    }

    pub fn owned_numbers(&self) -> Vec<PhoneNumber> {
        self.ownership.read().values().cloned().collect()
    }

    // ── Private ──────────────────────────────────────────────────────

    fn mutate_set(
        &self,
        set: &RwLock<Vec<AdminId>>,
        key: &'static str,
        id: AdminId,
        add: bool,
    ) -> Result<Membership> {
        let mut guard = set.write();
        if guard.contains(&id) == add {
            return Ok(Membership::Unchanged);
        }

        let mut next = guard.clone();
        if add {
            next.push(id);
        } else {
            next.retain(|x| *x != id);
        }
        self.store.save(key, &next)?;
        *guard = next;

        TraceEvent::AccessChanged {
            set: key,
            user_id: id.0,
            added: add,
        }
        .emit();
        Ok(Membership::Changed)
    }
}

fn dedup(ids: Vec<AdminId>) -> Vec<AdminId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Drop later duplicates of a phone so a hand-edited document cannot break
/// the one-chat-per-number rule.
fn injective(map: BTreeMap<ChatId, PhoneNumber>) -> BTreeMap<ChatId, PhoneNumber> {
    let mut seen = HashSet::new();
    map.into_iter()
        .filter(|(chat, phone)| {
            let first = seen.insert(phone.clone());
            if !first {
                tracing::warn!(chat_id = %chat, phone = %phone, "dropping duplicate ownership entry");
            }
            first
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone(s: &str) -> PhoneNumber {
        PhoneNumber::parse(s).unwrap()
    }

    fn open(dir: &std::path::Path) -> AccessRegistry {
        let config = AccessConfig {
            administrators: vec![AdminId(1)],
        };
        AccessRegistry::open(JsonStore::open(dir).unwrap(), &config).unwrap()
    }

    #[test]
    fn administrators_come_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let reg = open(dir.path());
        assert!(reg.is_administrator(AdminId(1)));
        assert!(!reg.is_administrator(AdminId(2)));
        assert!(reg.is_owner(AdminId(1)));
    }

    #[test]
    fn add_entitled_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let reg = open(dir.path());

        assert_eq!(reg.add_entitled(AdminId(2002)).unwrap(), Membership::Changed);
        assert_eq!(reg.add_entitled(AdminId(2002)).unwrap(), Membership::Unchanged);
        assert_eq!(reg.entitled(), vec![AdminId(2002)]);
    }

    #[test]
    fn remove_absent_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let reg = open(dir.path());

        assert_eq!(reg.remove_reseller(AdminId(5)).unwrap(), Membership::Unchanged);
        reg.add_reseller(AdminId(5)).unwrap();
        assert_eq!(reg.remove_reseller(AdminId(5)).unwrap(), Membership::Changed);
        assert!(!reg.is_reseller(AdminId(5)));
    }

    #[test]
    fn roles_are_not_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let reg = open(dir.path());
        reg.add_reseller(AdminId(1)).unwrap();
        reg.add_entitled(AdminId(1)).unwrap();

        assert!(reg.is_administrator(AdminId(1)));
        assert!(reg.is_reseller(AdminId(1)));
        assert!(reg.is_entitled(AdminId(1)));
    }

    #[test]
    fn mutations_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = open(dir.path());
            reg.add_reseller(AdminId(1001)).unwrap();
            reg.add_entitled(AdminId(2002)).unwrap();
            reg.bind_ownership(ChatId(2002), phone("15551234567")).unwrap();
        }
        let reg = open(dir.path());
        assert!(reg.is_reseller(AdminId(1001)));
        assert!(reg.is_entitled(AdminId(2002)));
        assert_eq!(reg.owner_of(&phone("15551234567")), Some(ChatId(2002)));
    }

    #[test]
    fn ownership_document_uses_string_keys() {
        let dir = tempfile::tempdir().unwrap();
        let reg = open(dir.path());
        reg.bind_ownership(ChatId(2002), phone("15551234567")).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("user_numbers.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc, serde_json::json!({ "2002": "15551234567" }));
    }

    #[test]
    fn rebinding_a_chat_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let reg = open(dir.path());

        reg.bind_ownership(ChatId(10), phone("11111111")).unwrap();
        let previous = reg.bind_ownership(ChatId(10), phone("22222222")).unwrap();

        assert_eq!(previous, Some(phone("11111111")));
        assert_eq!(reg.owner_of(&phone("11111111")), None);
        assert_eq!(reg.phone_of(ChatId(10)), Some(phone("22222222")));
        assert_eq!(reg.bindings().len(), 1);
    }

    #[test]
    fn binding_is_injective() {
        let dir = tempfile::tempdir().unwrap();
        let reg = open(dir.path());

        reg.bind_ownership(ChatId(10), phone("11111111")).unwrap();
        reg.bind_ownership(ChatId(20), phone("11111111")).unwrap();

        assert_eq!(reg.owner_of(&phone("11111111")), Some(ChatId(20)));
        assert_eq!(reg.phone_of(ChatId(10)), None);
        assert_eq!(reg.bindings().len(), 1);
    }

    #[test]
    fn unbind_phone_finds_owner() {
        let dir = tempfile::tempdir().unwrap();
        let reg = open(dir.path());
        reg.bind_ownership(ChatId(2002), phone("15551234567")).unwrap();

        assert_eq!(reg.unbind_phone(&phone("15551234567")).unwrap(), Some(ChatId(2002)));
        assert_eq!(reg.unbind_phone(&phone("15551234567")).unwrap(), None);
        assert!(reg.owned_numbers().is_empty());
    }

    #[test]
    fn duplicate_ids_on_disk_are_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("premium.json"), "[5, 5, 6]").unwrap();
        let reg = open(dir.path());
        assert_eq!(reg.entitled(), vec![AdminId(5), AdminId(6)]);
    }
}

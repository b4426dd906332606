use crate::session::DisplaySession;
use core_events::SessionId;
use smallvec::SmallVec;
use tracing::info;

/// The circular list of sibling sessions plus the active handle.
///
/// Sessions are addressed by [`SessionId`]; the dispatcher rotates which
/// session it polls first so none is starved.
#[derive(Debug, Default)]
pub struct SessionSet {
    sessions: Vec<DisplaySession>,
    active: Option<SessionId>,
    /// Index into `sessions` polled first on the next pass.
    rr: usize,
    next_id: u32,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier for the next session to be opened.
    pub fn allocate_id(&mut self) -> SessionId {
        self.next_id += 1;
        SessionId(self.next_id)
    }

    /// Add a session; the first one becomes active.
    pub fn push(&mut self, session: DisplaySession) -> SessionId {
        let id = session.id();
        self.next_id = self.next_id.max(id.0);
        self.sessions.push(session);
        if self.active.is_none() {
            self.active = Some(id);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> SmallVec<[SessionId; 4]> {
        self.sessions.iter().map(|s| s.id()).collect()
    }

    pub fn get(&self, id: SessionId) -> Option<&DisplaySession> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut DisplaySession> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisplaySession> {
        self.sessions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DisplaySession> {
        self.sessions.iter_mut()
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    pub fn active(&self) -> Option<&DisplaySession> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut DisplaySession> {
        let id = self.active?;
        self.get_mut(id)
    }

    pub fn set_active(&mut self, id: SessionId) -> bool {
        if self.get(id).is_some() {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    /// Poll order for this pass: the round-robin head first, then the rest
    /// in ring order.
    pub fn poll_order(&self) -> SmallVec<[SessionId; 4]> {
        let n = self.sessions.len();
        (0..n)
            .map(|i| self.sessions[(self.rr + i) % n].id())
            .collect()
    }

    /// Advance the round-robin head by one.
    pub fn rotate(&mut self) {
        if !self.sessions.is_empty() {
            self.rr = (self.rr + 1) % self.sessions.len();
        }
    }

    /// Remove a session (window closed or connection lost). If it was the
    /// active one, the next session in ring order takes over; the returned
    /// id is the new active session, if any.
    pub fn remove(&mut self, id: SessionId) -> (Option<DisplaySession>, Option<SessionId>) {
        let Some(pos) = self.sessions.iter().position(|s| s.id() == id) else {
            return (None, self.active);
        };
        let removed = self.sessions.remove(pos);
        if self.sessions.is_empty() {
            self.rr = 0;
            self.active = None;
        } else {
            if self.rr > pos {
                self.rr -= 1;
            }
            self.rr %= self.sessions.len();
            if self.active == Some(id) {
                let next = self.sessions[pos % self.sessions.len()].id();
                info!(target: "session", from = %id, to = %next, "active_failover");
                self.active = Some(next);
            }
        }
        (Some(removed), self.active)
    }

    /// Whether any session has background work outstanding.
    /// Whether any session has idle work. Background scroll only counts for
    /// siblings of the active session.
    pub fn has_idle_work(&self) -> bool {
        self.sessions.iter().any(|s| {
            if Some(s.id()) == self.active {
                s.work.foreground()
            } else {
                s.work.pending()
            }
        })
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Site {
    Petlove,
    PetloveV2,
    Cobasi,
    GoogleShopping,
}

impl Site {
    pub const ALL: [Site; 4] = [
        Site::Petlove,
        Site::PetloveV2,
        Site::Cobasi,
        Site::GoogleShopping,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Site::Petlove => "petlove",
            Site::PetloveV2 => "petlove_v2",
            Site::Cobasi => "cobasi",
            Site::GoogleShopping => "google_shopping",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "petlove" => Some(Site::Petlove),
            "petlove_v2" => Some(Site::PetloveV2),
            "cobasi" => Some(Site::Cobasi),
            "google_shopping" => Some(Site::GoogleShopping),
            _ => None,
        }
    }
}

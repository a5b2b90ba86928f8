use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 匿名表示時の氏名プレースホルダ。
pub const ANONYMOUS_FIRST_NAME: &str = "Anonymous";
pub const ANONYMOUS_LAST_NAME: &str = "profile";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Player,
    Coach,
    Club,
    Scout,
    Guest,
}

impl ProfileKind {
    pub fn as_str(&self) -> &str {
        match self {
            ProfileKind::Player => "player",
            ProfileKind::Coach => "coach",
            ProfileKind::Club => "club",
            ProfileKind::Scout => "scout",
            ProfileKind::Guest => "guest",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "player" => Some(ProfileKind::Player),
            "coach" => Some(ProfileKind::Coach),
            "club" => Some(ProfileKind::Club),
            "scout" => Some(ProfileKind::Scout),
            "guest" => Some(ProfileKind::Guest),
            _ => None,
        }
    }
}

/// AnonymousPromotion はプロフィールが匿名プロモーションに参加している状態。
/// anonymous_uuid はプロモーションごとに固定される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymousPromotion {
    pub anonymous_uuid: Uuid,
    pub promoted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileBase {
    pub id: i64,
    pub uuid: Uuid,
    pub user_id: Uuid,
    pub slug: String,
    pub first_name: String,
    pub last_name: String,
    pub picture_url: Option<String>,
    pub premium_until: Option<DateTime<Utc>>,
    pub anonymous_promotion: Option<AnonymousPromotion>,
}

/// Profile は外部のプロフィールサービスから取得するデータ。種別は閉じた集合。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Profile {
    Player {
        #[serde(flatten)]
        base: ProfileBase,
        team: Option<String>,
    },
    Coach {
        #[serde(flatten)]
        base: ProfileBase,
        club: Option<String>,
    },
    Club {
        #[serde(flatten)]
        base: ProfileBase,
        club_name: String,
    },
    Scout {
        #[serde(flatten)]
        base: ProfileBase,
        agency: Option<String>,
    },
    Guest {
        #[serde(flatten)]
        base: ProfileBase,
    },
}

impl Profile {
    pub fn base(&self) -> &ProfileBase {
        match self {
            Profile::Player { base, .. }
            | Profile::Coach { base, .. }
            | Profile::Club { base, .. }
            | Profile::Scout { base, .. }
            | Profile::Guest { base } => base,
        }
    }

    pub fn affiliation(&self) -> Option<String> {
        match self {
            Profile::Player { team, .. } => team.clone(),
            Profile::Coach { club, .. } => club.clone(),
            Profile::Club { club_name, .. } => Some(club_name.clone()),
            Profile::Scout { agency, .. } => agency.clone(),
            Profile::Guest { .. } => None,
        }
    }
}

/// AddressableProfile は問い合わせの送信先・送信元になれるプロフィールの振る舞い。
pub trait AddressableProfile {
    fn kind(&self) -> ProfileKind;
    fn user_id(&self) -> Uuid;
    fn is_premium(&self, now: DateTime<Utc>) -> bool;
    /// 匿名プロモーション中であればその匿名 UUID を返す。
    fn anonymous_uuid(&self) -> Option<Uuid>;
    fn display_identity(&self) -> Identity;
}

impl AddressableProfile for Profile {
    fn kind(&self) -> ProfileKind {
        match self {
            Profile::Player { .. } => ProfileKind::Player,
            Profile::Coach { .. } => ProfileKind::Coach,
            Profile::Club { .. } => ProfileKind::Club,
            Profile::Scout { .. } => ProfileKind::Scout,
            Profile::Guest { .. } => ProfileKind::Guest,
        }
    }

    fn user_id(&self) -> Uuid {
        self.base().user_id
    }

    fn is_premium(&self, now: DateTime<Utc>) -> bool {
        self.base().premium_until.is_some_and(|until| until > now)
    }

    fn anonymous_uuid(&self) -> Option<Uuid> {
        self.base()
            .anonymous_promotion
            .as_ref()
            .map(|p| p.anonymous_uuid)
    }

    fn display_identity(&self) -> Identity {
        let base = self.base();
        Identity {
            id: base.id,
            uuid: base.uuid,
            slug: base.slug.clone(),
            kind: Some(self.kind()),
            first_name: base.first_name.clone(),
            last_name: base.last_name.clone(),
            picture_url: base.picture_url.clone(),
            affiliation: self.affiliation(),
            phone: None,
            email: None,
            is_anonymous: false,
        }
    }
}

/// Identity はリクエスト表示時に相手側として見せるプロフィール情報。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub uuid: Uuid,
    pub slug: String,
    pub kind: Option<ProfileKind>,
    pub first_name: String,
    pub last_name: String,
    pub picture_url: Option<String>,
    pub affiliation: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_anonymous: bool,
}

impl Identity {
    /// 匿名 UUID から作る疑似アイデンティティ。実名に繋がる項目はすべて空にする。
    pub fn anonymous(anonymous_uuid: Uuid, kind: Option<ProfileKind>) -> Self {
        Self {
            id: 0,
            uuid: anonymous_uuid,
            slug: format!("anonymous-{anonymous_uuid}"),
            kind,
            first_name: ANONYMOUS_FIRST_NAME.to_string(),
            last_name: ANONYMOUS_LAST_NAME.to_string(),
            picture_url: None,
            affiliation: None,
            phone: None,
            email: None,
            is_anonymous: true,
        }
    }

    /// 匿名 UUID がどこにも見つからない場合の縮退表示。
    pub fn unknown(kind: Option<ProfileKind>) -> Self {
        let mut identity = Self::anonymous(Uuid::nil(), kind);
        identity.slug = "anonymous-unknown".to_string();
        identity
    }

    pub fn with_contact(mut self, phone: Option<String>, email: Option<String>) -> Self {
        self.phone = phone;
        self.email = email;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_base() -> ProfileBase {
        ProfileBase {
            id: 42,
            uuid: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            slug: "jan-kowalski".to_string(),
            first_name: "Jan".to_string(),
            last_name: "Kowalski".to_string(),
            picture_url: Some("https://cdn.example.com/jan.png".to_string()),
            premium_until: None,
            anonymous_promotion: None,
        }
    }

    #[test]
    fn test_is_premium_respects_expiry() {
        let now = Utc::now();
        let mut base = sample_base();
        base.premium_until = Some(now + Duration::days(3));
        let profile = Profile::Guest { base: base.clone() };
        assert!(profile.is_premium(now));

        base.premium_until = Some(now - Duration::days(1));
        let profile = Profile::Guest { base };
        assert!(!profile.is_premium(now));
    }

    #[test]
    fn test_display_identity_uses_affiliation() {
        let profile = Profile::Player {
            base: sample_base(),
            team: Some("KS Cracovia".to_string()),
        };
        let identity = profile.display_identity();
        assert_eq!(identity.id, 42);
        assert_eq!(identity.kind, Some(ProfileKind::Player));
        assert_eq!(identity.affiliation.as_deref(), Some("KS Cracovia"));
        assert!(!identity.is_anonymous);
    }

    #[test]
    fn test_anonymous_identity_is_scrubbed() {
        let anonymous_uuid = Uuid::new_v4();
        let identity = Identity::anonymous(anonymous_uuid, Some(ProfileKind::Coach));
        assert_eq!(identity.id, 0);
        assert_eq!(identity.slug, format!("anonymous-{anonymous_uuid}"));
        assert_eq!(identity.first_name, ANONYMOUS_FIRST_NAME);
        assert_eq!(identity.last_name, ANONYMOUS_LAST_NAME);
        assert!(identity.picture_url.is_none());
        assert!(identity.affiliation.is_none());
        assert!(identity.is_anonymous);
    }

    #[test]
    fn test_unknown_identity() {
        let identity = Identity::unknown(None);
        assert_eq!(identity.uuid, Uuid::nil());
        assert_eq!(identity.slug, "anonymous-unknown");
    }

    #[test]
    fn test_profile_json_is_tagged() {
        let profile = Profile::Club {
            base: sample_base(),
            club_name: "Wisla".to_string(),
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["kind"], "club");
        assert_eq!(json["club_name"], "Wisla");
        let back: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }
}

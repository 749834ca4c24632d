pub mod click_event;
pub mod device_profile;
pub mod fingerprint_correlation;
pub mod short_link;

pub use click_event::Entity as ClickEventEntity;
pub use device_profile::Entity as DeviceProfileEntity;
pub use fingerprint_correlation::Entity as FingerprintCorrelationEntity;
pub use short_link::Entity as ShortLinkEntity;

/// Macro for declaring a subject struct together with its [Subject][crate::Subject] impl.
///
/// Every declared field becomes a condition attribute under its own name, converted
/// with `serde_json::to_value`, so field types must implement `Serialize`.
///
/// Example usage:
/// ```
/// use abilitycrab::{define_subject, Condition, Subject};
///
/// define_subject! {
///     /// A household the actor belongs to
///     #[derive(Debug, Clone)]
///     pub struct Household: "household" {
///         pub id: u64,
///         pub name: String,
///         pub owner_id: Option<u64>,
///     }
/// }
///
/// let home = Household { id: 1, name: "Home".to_string(), owner_id: None };
/// assert_eq!(home.subject_type(), "household");
/// assert_eq!(home.attribute("id"), Some(serde_json::json!(1)));
/// assert!(!Condition::exists("owner_id").matches(&home));
/// assert_eq!(home.attribute("missing"), None);
/// ```
#[macro_export]
macro_rules! define_subject {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $subject_type:literal {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $field_ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $field_ty,
            )*
        }

        impl $name {
            #[allow(unused)]
            pub const SUBJECT_TYPE: &'static str = $subject_type;

            /// Attribute names usable in rule conditions and field restrictions.
            #[allow(unused)]
            pub fn attribute_names() -> &'static [&'static str] {
                &[$(stringify!($field),)*]
            }
        }

        impl $crate::Subject for $name {
            fn subject_type(&self) -> &str {
                $subject_type
            }

            fn attribute(&self, name: &str) -> Option<$crate::__serde_json::Value> {
                match name {
                    $(stringify!($field) => $crate::__serde_json::to_value(&self.$field).ok(),)*
                    _ => None,
                }
            }
        }
    };
}

/// Generate a read-only view over a flag bitmask.
///
/// Each field becomes a predicate method testing its bit(s); the raw
/// mask stays reachable through `bits()`.
///
/// # Syntax
///
/// ```ignore
/// flags! {
///     pub struct SomeFlags(u16) {
///         pub some_flag = 0x0001;
///     }
/// }
/// ```
macro_rules! flags {
    {
        $(#[doc = $struct_doc:expr])*
        $struct_vis:vis struct $struct_name:ident($type:ty) {
            $(
                $(#[doc = $field_doc:expr])*
                $field_vis:vis $field_name:ident = $field_value:expr;
            )*
        }
    } => {
        #[derive(Clone, Copy)]
        $(#[doc = $struct_doc])*
        $struct_vis struct $struct_name($type);

        impl $struct_name {
            pub fn new(flags: $type) -> Self {
                Self(flags)
            }

            /// The raw bitmask.
            #[allow(dead_code)]
            pub fn bits(&self) -> $type {
                self.0
            }

            $(
                $(#[doc = $field_doc])*
                $field_vis fn $field_name(&self) -> bool {
                    self.0 & $field_value == $field_value
                }
            )*
        }

        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($struct_name))
                    $(
                        .field(stringify!($field_name), &self.$field_name())
                    )*
                    .finish()
            }
        }
    }
}

/// Generate an enum decoded from an integer tag, with an `Unknown`
/// case holding tags we don't recognize.
macro_rules! int_enum {
    {
        $(#[doc = $struct_doc:expr])*
        $vis:vis enum $name:ident : $type:ty {
            $(
                $(#[doc = $field_doc:expr])*
                $field_name:ident = $field_value:expr,
            )*
        }
    } => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $(#[doc = $struct_doc])*
        $vis enum $name {
            $(
                $(#[doc = $field_doc])*
                $field_name,
            )*
            Unknown($type),
        }

        impl From<$type> for $name {
            fn from(value: $type) -> Self {
                match value {
                    $(
                        $field_value => $name::$field_name,
                    )*
                    _ => $name::Unknown(value),
                }
            }
        }
    };
}

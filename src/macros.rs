//! Declarative macros used throughout the crate.

/// A helper macro for silencing warnings when a type is only implemented so
/// that it can be linked in the docs.
macro_rules! used_in_docs {
    ($( $t:ident ),+) => {
        const _: () = {
            // Using a module here means that this macro can accept any identifier that
            // would normally be used in an import statement.
            #[allow(unused_imports)]
            mod use_item {
                $( use super::$t; )+
            }
        };
    };
}

/// Macro for defining a closed, strict enum usable as a `SizedIntEnum`
/// enumerator: any value outside the listed set is a parse error, not a
/// permissive fallback.
macro_rules! closed_enum {
    {
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident : $repr:ty {
            $(
                $( #[$variant_meta:meta] )*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    } => {
        $( #[$meta] )*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        $vis enum $name {
            $(
                $( #[$variant_meta] )*
                $variant,
            )*
        }

        impl $name {
            #[allow(dead_code)]
            const fn to_repr(self) -> $repr {
                match self {
                    $( Self::$variant => $value, )*
                }
            }
        }

        impl ::std::convert::TryFrom<i128> for $name {
            type Error = crate::error::ParseError;

            fn try_from(value: i128) -> ::std::result::Result<Self, Self::Error> {
                match value {
                    $( v if v == ($value as i128) => Ok(Self::$variant), )*
                    other => Err(crate::error::ParseError::semantic(format!(
                        concat!(stringify!($name), ": unknown value {}"),
                        other
                    ))),
                }
            }
        }

        impl ::std::convert::From<$name> for i128 {
            fn from(value: $name) -> i128 {
                value.to_repr() as i128
            }
        }
    };
}

/// Declares a named, ordered schema: a record type whose fields are each
/// decoded by a [`Descriptor`](crate::schema::Descriptor) in declaration
/// order, and whose binary form is the concatenation of each field's
/// encoded bytes, computed once and cached.
///
/// Fields are private and set only at construction (`new`, or `read`);
/// there is no public setter, so the binary cache is always either empty
/// or correct and the dirty bit degenerates to a plain lazy-init flag.
macro_rules! schema {
    (
        $( #[$meta:meta] )*
        $vis:vis struct $name:ident {
            $( $field:ident : $ty:ty = $desc:expr ),* $(,)?
        }
        $( ; post_init = $post_init:expr )?
    ) => {
        $( #[$meta] )*
        $vis struct $name {
            $( $field : $ty, )*
            binary: ::std::cell::RefCell<Option<::std::vec::Vec<u8>>>,
        }

        impl $name {
            /// Construct directly from field values (not via parsing).
            #[allow(clippy::too_many_arguments)]
            $vis fn new( $( $field : $ty ),* ) -> Self {
                #[allow(unused_mut)]
                let mut value = Self {
                    $( $field, )*
                    binary: ::std::cell::RefCell::new(None),
                };
                $( let hook: fn(&mut Self) = $post_init; hook(&mut value); )?
                value
            }

            $(
                #[allow(missing_docs)]
                $vis fn $field(&self) -> &$ty {
                    &self.$field
                }
            )*

            /// A parse computation decoding one instance from `buffer`.
            $vis async fn read(
                buffer: &$crate::engine::SharedBuffer,
            ) -> ::std::result::Result<Self, $crate::error::ParseError> {
                $( let $field = $crate::schema::Descriptor::read(&$desc, buffer).await?; )*
                ::std::result::Result::Ok(Self::new( $( $field ),* ))
            }

            /// This instance's binary form, recomputing and caching it if
            /// the dirty bit is set.
            $vis fn to_bytes(&self) -> ::std::result::Result<::std::vec::Vec<u8>, $crate::error::ParseError> {
                if let Some(cached) = self.binary.borrow().as_ref() {
                    return Ok(cached.clone());
                }
                let mut out = ::std::vec::Vec::new();
                $( out.extend($crate::schema::Descriptor::write(&$desc, &self.$field)?); )*
                *self.binary.borrow_mut() = Some(out.clone());
                Ok(out)
            }
        }

        impl ::std::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                true $( && self.$field == other.$field )*
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(::std::stringify!($name))
                    $( .field(::std::stringify!($field), &self.$field) )*
                    .finish()
            }
        }

        impl ::std::clone::Clone for $name {
            fn clone(&self) -> Self {
                Self::new( $( ::std::clone::Clone::clone(&self.$field) ),* )
            }
        }

        impl $crate::schema::SchemaRecord for $name {
            async fn read(buffer: &$crate::engine::SharedBuffer) -> ::std::result::Result<Self, $crate::error::ParseError> {
                Self::read(buffer).await
            }

            fn to_bytes(&self) -> ::std::result::Result<::std::vec::Vec<u8>, $crate::error::ParseError> {
                self.to_bytes()
            }
        }
    };
}

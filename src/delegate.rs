/// A callable that can be dispatched together with a tuple of arguments.
///
/// This is implemented for every [`FnOnce`] taking up to eight arguments,
/// with `Args` being the tuple of its argument types (`()` for no arguments).
/// Arity and argument types are checked at compile time.
///
/// ```
/// use ferry::Delegate;
///
/// fn greet(name: &'static str, excited: bool) -> String {
///     format!("hello {name}{}", if excited { "!" } else { "" })
/// }
///
/// assert_eq!("hello world!", greet.call_with(("world", true)));
/// ```
pub trait Delegate<Args>: Send + 'static {
    type Output: Send + 'static;

    fn call_with(self, args: Args) -> Self::Output;
}

macro_rules! impl_delegate {
    ($($arg:ident),*) => {
        impl<Func, Out, $($arg,)*> Delegate<($($arg,)*)> for Func
        where
            Func: FnOnce($($arg),*) -> Out + Send + 'static,
            Out: Send + 'static,
        {
            type Output = Out;

            #[allow(non_snake_case)]
            fn call_with(self, ($($arg,)*): ($($arg,)*)) -> Out {
                self($($arg),*)
            }
        }
    };
}

impl_delegate!();
impl_delegate!(T1);
impl_delegate!(T1, T2);
impl_delegate!(T1, T2, T3);
impl_delegate!(T1, T2, T3, T4);
impl_delegate!(T1, T2, T3, T4, T5);
impl_delegate!(T1, T2, T3, T4, T5, T6);
impl_delegate!(T1, T2, T3, T4, T5, T6, T7);
impl_delegate!(T1, T2, T3, T4, T5, T6, T7, T8);

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(a: u8, b: u16, c: u32) -> u64 {
        u64::from(a) + u64::from(b) + u64::from(c)
    }

    #[test]
    fn calls_without_arguments() {
        assert_eq!("empty", (|| "empty").call_with(()));
    }

    #[test]
    fn calls_with_a_single_argument() {
        assert_eq!(4, (|x: i32| x * 2).call_with((2,)));
    }

    #[test]
    fn calls_fn_items() {
        assert_eq!(6, sum.call_with((1, 2, 3)));
    }

    #[test]
    fn moves_owned_arguments() {
        let joined = (|a: String, b: Vec<&'static str>| format!("{a}{}", b.concat()))
            .call_with(("x".to_owned(), vec!["y", "z"]));
        assert_eq!("xyz", joined);
    }

    #[test]
    fn calls_with_eight_arguments() {
        let total = (|a: u8, b: u8, c: u8, d: u8, e: u8, f: u8, g: u8, h: u8| {
            a + b + c + d + e + f + g + h
        })
        .call_with((1, 1, 1, 1, 1, 1, 1, 1));
        assert_eq!(8, total);
    }
}
